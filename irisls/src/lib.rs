extern crate clap;
extern crate iris;

pub mod cli;
pub mod error;
pub mod run;
pub mod utils;
