pub mod chrome_host;
pub mod connection;
pub mod headless;

pub use chrome_host::ChromeHost;
pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;
