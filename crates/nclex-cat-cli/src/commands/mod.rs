pub mod init;
pub mod inspect;
pub mod simulate;
pub mod summarize;
pub mod validate;
