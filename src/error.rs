use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("no base image is loaded")]
    NoImage,

    #[error("cannot allocate a {width}x{height} pixmap")]
    PixmapAllocation { width: u32, height: u32 },

    #[error("bitmap of {actual} bytes does not match {width}x{height} RGBA")]
    BitmapSizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("crop rectangle is empty after clamping to the image")]
    EmptyCrop,
}

pub type EditorResult<T> = Result<T, EditorError>;
