/// A single stimulation: an event identifier with a date and a duration, both in fixed-point
/// time units (see `time_arith`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stimulation {
    pub identifier: u64,
    pub date: u64,
    pub duration: u64,
}

impl Stimulation {
    pub fn new(identifier: u64, date: u64, duration: u64) -> Self {
        Self {
            identifier,
            date,
            duration,
        }
    }
}

/// Ordered sequence of stimulations.
///
/// Entries are kept in insertion order, which is chronological by convention only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StimulationSet {
    stimulations: Vec<Stimulation>,
}

impl StimulationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, identifier: u64, date: u64, duration: u64) {
        self.stimulations
            .push(Stimulation::new(identifier, date, duration));
    }

    pub fn len(&self) -> usize {
        self.stimulations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimulations.is_empty()
    }

    pub fn clear(&mut self) {
        self.stimulations.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Stimulation> {
        self.stimulations.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Stimulation> {
        self.stimulations.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stimulation> {
        self.stimulations.iter()
    }

    /// Append every stimulation of another set
    pub fn extend_from(&mut self, other: &StimulationSet) {
        self.stimulations.extend_from_slice(&other.stimulations);
    }
}

impl FromIterator<Stimulation> for StimulationSet {
    fn from_iter<I: IntoIterator<Item = Stimulation>>(iter: I) -> Self {
        Self {
            stimulations: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StimulationSet {
    type Item = &'a Stimulation;
    type IntoIter = std::slice::Iter<'a, Stimulation>;

    fn into_iter(self) -> Self::IntoIter {
        self.stimulations.iter()
    }
}
