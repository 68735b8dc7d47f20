pub mod connection;

pub use connection::{connect_session, connect_to_browser_and_page, site_origin};
