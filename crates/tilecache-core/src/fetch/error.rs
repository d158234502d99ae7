use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Tile request timed out")]
    Timeout,

    #[error("Tile server answered with status {0}")]
    Status(u16),

    #[error("Truncated tile body: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("Response is not a recognised image format")]
    NotAnImage,

    #[error("Zoom {zoom} is beyond the source maximum of {max_zoom}")]
    ZoomOutOfRange { zoom: u8, max_zoom: u8 },
}

impl FetchError {
    /// Classify a transport error, keeping timeouts distinct.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}
