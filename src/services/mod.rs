pub mod cns;
pub mod fuzzy;
pub mod init;
pub mod resolver;
pub mod timetable;
pub mod upstream;

#[cfg(test)]
pub mod mock;
