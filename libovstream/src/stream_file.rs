use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::constants::*;
use super::ebml::{decode_str, decode_uint};
use super::ebml_reader::{EbmlReader, ReaderCallback};
use super::ebml_writer::EbmlWriter;
use super::error::StreamFileError;

/// Size of the blocks pulled from disk while looking for the next chunk
const READ_BLOCK_SIZE: usize = 64 * 1024;

/// One encoded stream message with the time window it covers (fixed-point time)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub start_time: u64,
    pub end_time: u64,
    pub content: Vec<u8>,
}

impl StreamChunk {
    pub fn new(start_time: u64, end_time: u64, content: Vec<u8>) -> Self {
        Self {
            start_time,
            end_time,
            content,
        }
    }
}

/// Description found at the start of a stream file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFileHeader {
    pub version: u64,
    pub stream_type: String,
    /// Unix timestamp of the file creation
    pub creation_time: u64,
}

/// StreamFileWriter persists the messages of one stream.
///
/// The file is a sequence of top level nodes: one header describing the stream, then one
/// chunk node per message.
#[derive(Debug)]
pub struct StreamFileWriter {
    file: BufWriter<File>,
    writer: EbmlWriter,
    path: PathBuf,
    chunk_count: u64,
}

impl StreamFileWriter {
    /// Create (truncate) the file and write its header
    pub fn create(path: &Path, stream_type: &str) -> Result<Self, StreamFileError> {
        let file = BufWriter::new(File::create(path)?);
        let creation_time = time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        let mut stream_file = Self {
            file,
            writer: EbmlWriter::new(),
            path: path.to_path_buf(),
            chunk_count: 0,
        };
        stream_file.writer.open_child(NODE_FILE_HEADER)?;
        stream_file
            .writer
            .write_uint(NODE_FILE_HEADER_VERSION, STREAM_FILE_VERSION)?;
        stream_file
            .writer
            .write_str(NODE_FILE_HEADER_STREAM_TYPE, stream_type)?;
        stream_file
            .writer
            .write_uint(NODE_FILE_HEADER_CREATION_TIME, creation_time)?;
        stream_file.writer.close_child()?;
        stream_file.flush_writer()?;
        Ok(stream_file)
    }

    fn flush_writer(&mut self) -> Result<(), StreamFileError> {
        let bytes = self.writer.take_output()?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_chunk(&mut self, chunk: &StreamChunk) -> Result<(), StreamFileError> {
        self.writer.open_child(NODE_FILE_CHUNK)?;
        self.writer
            .write_uint(NODE_FILE_CHUNK_START_TIME, chunk.start_time)?;
        self.writer.write_uint(NODE_FILE_CHUNK_END_TIME, chunk.end_time)?;
        self.writer
            .write_binary(NODE_FILE_CHUNK_CONTENT, &chunk.content)?;
        self.writer.close_child()?;
        self.flush_writer()?;
        self.chunk_count += 1;
        Ok(())
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush everything to disk. Returns the number of chunks written.
    pub fn close(mut self) -> Result<u64, StreamFileError> {
        self.file.flush()?;
        Ok(self.chunk_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FileSection {
    #[default]
    Top,
    Header,
    Chunk,
}

/// Collects the header and chunks out of the parse events of the file
#[derive(Debug, Default)]
struct ChunkCollector {
    section: FileSection,
    header: Option<StreamFileHeader>,
    pending_header: StreamFileHeader,
    pending_chunk: StreamChunk,
    chunks: VecDeque<StreamChunk>,
}

impl ReaderCallback for ChunkCollector {
    type Error = StreamFileError;

    fn is_master_child(&mut self, id: u64) -> bool {
        id == NODE_FILE_HEADER || id == NODE_FILE_CHUNK
    }

    fn open_child(&mut self, id: u64) -> Result<(), StreamFileError> {
        match (self.section, id) {
            (FileSection::Top, NODE_FILE_HEADER) if self.header.is_none() => {
                self.pending_header = StreamFileHeader::default();
                self.section = FileSection::Header;
            }
            (FileSection::Top, NODE_FILE_CHUNK) if self.header.is_some() => {
                self.pending_chunk = StreamChunk::default();
                self.section = FileSection::Chunk;
            }
            (FileSection::Top, NODE_FILE_CHUNK) => return Err(StreamFileError::MissingHeader),
            (FileSection::Top, _) => return Err(StreamFileError::UnexpectedNode(id)),
            (FileSection::Header, NODE_FILE_HEADER | NODE_FILE_CHUNK)
            | (FileSection::Chunk, NODE_FILE_HEADER | NODE_FILE_CHUNK) => {
                return Err(StreamFileError::UnexpectedNode(id))
            }
            // Unknown leaves inside a section are skipped
            _ => (),
        }
        Ok(())
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), StreamFileError> {
        match (self.section, id) {
            (FileSection::Header, NODE_FILE_HEADER_VERSION) => {
                self.pending_header.version = decode_uint(data)?
            }
            (FileSection::Header, NODE_FILE_HEADER_STREAM_TYPE) => {
                self.pending_header.stream_type = decode_str(data)
            }
            (FileSection::Header, NODE_FILE_HEADER_CREATION_TIME) => {
                self.pending_header.creation_time = decode_uint(data)?
            }
            (FileSection::Chunk, NODE_FILE_CHUNK_START_TIME) => {
                self.pending_chunk.start_time = decode_uint(data)?
            }
            (FileSection::Chunk, NODE_FILE_CHUNK_END_TIME) => {
                self.pending_chunk.end_time = decode_uint(data)?
            }
            (FileSection::Chunk, NODE_FILE_CHUNK_CONTENT) => {
                self.pending_chunk.content = data.to_vec()
            }
            _ => (),
        }
        Ok(())
    }

    fn close_child(&mut self, id: u64) -> Result<(), StreamFileError> {
        match id {
            NODE_FILE_HEADER => {
                self.header = Some(std::mem::take(&mut self.pending_header));
                self.section = FileSection::Top;
            }
            NODE_FILE_CHUNK => {
                self.chunks
                    .push_back(std::mem::take(&mut self.pending_chunk));
                self.section = FileSection::Top;
            }
            _ => (),
        }
        Ok(())
    }
}

/// StreamFileReader hands out the chunks of a stream file one at a time.
#[derive(Debug)]
pub struct StreamFileReader {
    file: BufReader<File>,
    reader: EbmlReader,
    collector: ChunkCollector,
    header: StreamFileHeader,
    file_size: u64,
    is_eof: bool,
}

impl StreamFileReader {
    /// Open a stream file and read its header
    pub fn open(path: &Path) -> Result<Self, StreamFileError> {
        if !path.exists() {
            return Err(StreamFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut stream_file = Self {
            file: BufReader::new(file),
            reader: EbmlReader::new(),
            collector: ChunkCollector::default(),
            header: StreamFileHeader::default(),
            file_size,
            is_eof: false,
        };
        while stream_file.collector.header.is_none() {
            if !stream_file.read_block()? {
                return Err(StreamFileError::MissingHeader);
            }
        }
        if let Some(header) = &stream_file.collector.header {
            stream_file.header = header.clone();
        }
        spdlog::debug!(
            "Opened stream file {path:?} holding a {} stream (format version {})",
            stream_file.header.stream_type,
            stream_file.header.version
        );
        Ok(stream_file)
    }

    /// Feed the next block of the file to the parser. Returns false at the end of the file.
    fn read_block(&mut self) -> Result<bool, StreamFileError> {
        if self.is_eof {
            return Ok(false);
        }
        let mut block = vec![0; READ_BLOCK_SIZE];
        let read = self.file.read(&mut block)?;
        if read == 0 {
            self.is_eof = true;
            return Ok(false);
        }
        self.reader
            .process_data(&block[..read], &mut self.collector)?;
        Ok(true)
    }

    /// Get the next chunk in the file
    ///
    /// Returns a `Result<Option<StreamChunk>>`. The Option is None once every chunk has been
    /// read.
    pub fn next_chunk(&mut self) -> Result<Option<StreamChunk>, StreamFileError> {
        loop {
            if let Some(chunk) = self.collector.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if !self.read_block()? {
                if self.reader.is_idle() {
                    return Ok(None);
                }
                return Err(StreamFileError::TruncatedChunk);
            }
        }
    }

    pub fn header(&self) -> &StreamFileHeader {
        &self.header
    }

    pub fn stream_type(&self) -> &str {
        &self.header.stream_type
    }

    /// Fraction of the file parsed so far
    pub fn progress(&self) -> f32 {
        if self.file_size == 0 {
            return 1.0;
        }
        self.reader.bytes_read() as f32 / self.file_size as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.ovs");
        let chunks: Vec<StreamChunk> = (0..500u64)
            .map(|i| StreamChunk::new(i << 32, (i + 1) << 32, vec![i as u8; 300]))
            .collect();

        let mut writer = StreamFileWriter::create(&path, "Signal").unwrap();
        for chunk in &chunks {
            writer.write_chunk(chunk).unwrap();
        }
        assert_eq!(writer.close().unwrap(), 500);

        let mut reader = StreamFileReader::open(&path).unwrap();
        assert_eq!(reader.stream_type(), "Signal");
        assert_eq!(reader.header().version, STREAM_FILE_VERSION);
        let mut read = vec![];
        while let Some(chunk) = reader.next_chunk().unwrap() {
            read.push(chunk);
        }
        assert_eq!(read, chunks);
        assert_eq!(reader.progress(), 1.0);
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.ovs");
        let mut writer = StreamFileWriter::create(&path, "Stimulations").unwrap();
        writer
            .write_chunk(&StreamChunk::new(0, 1, vec![1, 2, 3, 4]))
            .unwrap();
        writer.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        let mut reader = StreamFileReader::open(&path).unwrap();
        match reader.next_chunk() {
            Err(StreamFileError::TruncatedChunk) => (),
            _ => panic!("A cut chunk must be reported"),
        }
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.ovs");
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_FILE_CHUNK).unwrap();
        writer.close_child().unwrap();
        std::fs::write(&path, writer.take_output().unwrap()).unwrap();

        match StreamFileReader::open(&path) {
            Err(StreamFileError::MissingHeader) => (),
            _ => panic!("A file without header must be rejected"),
        }
        match StreamFileReader::open(&dir.path().join("missing.ovs")) {
            Err(StreamFileError::BadFilePath(_)) => (),
            _ => panic!("A missing file must be rejected"),
        }
    }
}
