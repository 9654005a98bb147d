pub mod limit_writer;
pub mod operation_reader;
