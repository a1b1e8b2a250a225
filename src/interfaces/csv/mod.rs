pub mod attempt_reader;
pub mod catalog_reader;
pub mod course_writer;
