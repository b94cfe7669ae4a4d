mod chunk;
mod drive;

pub use chunk::{CHUNK_SIZE, Chunk, TransferSession};
pub use drive::{DriveTransport, RemoteArchive, ResumeState, ZIP_MIME, resume_path};
