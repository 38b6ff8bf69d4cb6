#[path = "../support/dir_scenario.rs"]
mod dir_scenario;
#[path = "../support/faulty_fs.rs"]
mod faulty_fs;

mod directory_structure_it;
mod format_it;
