// Sample logging: record format, storage collaborator and the double
// buffer that keeps storage writes off the control path.

pub mod double_buffer;
pub mod record;
pub mod storage;
