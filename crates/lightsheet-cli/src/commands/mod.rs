pub mod config;
pub mod inspect;
pub mod run;
pub mod settings;
