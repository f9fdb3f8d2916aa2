pub mod run;
pub mod site;
