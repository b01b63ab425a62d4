// Detection stages, in pipeline order, plus the buffers and filters they share.

pub mod image;
pub mod filter;
pub mod preprocessor;
pub mod segmenter;
pub mod contour;
pub mod grader;
