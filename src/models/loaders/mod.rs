pub mod json_loader;

pub use json_loader::{
    load_automation_config, load_product_config, load_profiles, read_json_file, write_json_file,
};
