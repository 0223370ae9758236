mod client;

pub mod prelude {
    pub use crate::client::HttpClient;

    // Re-exported so that scenarios can build requests without depending on reqwest directly.
    pub use reqwest::{Method, RequestBuilder};
}
