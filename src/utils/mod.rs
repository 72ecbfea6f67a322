pub mod checksum;
pub mod file_io;
pub mod keys;

#[cfg(test)]
mod checksum_test;
#[cfg(test)]
mod keys_test;
