pub mod frame;
pub mod segmenter;

pub use frame::{AudioFrame, Utterance};
pub use segmenter::{AudioSegmenter, SegmenterConfig, SegmenterMetrics};
