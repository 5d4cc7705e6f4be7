pub mod run;
pub mod show;
