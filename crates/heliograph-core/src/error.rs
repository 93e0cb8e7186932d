use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeliographError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Geometry estimation failed: {0}")]
    Geometry(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, HeliographError>;
