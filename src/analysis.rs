//! Brand mention analysis over the answers of a run.

pub mod aggregator;
pub mod brands;
pub mod detector;

pub use aggregator::{load_answers, render_summary, save_analysis, summarize, BrandSummary};
pub use brands::{Brand, BrandRegistry};
pub use detector::{
    analyze_answers, analyze_answers_chunked, calculate_position_score, detect_mentions,
    AnalysisRecord, Answer, Mention, MentionDetector, DEFAULT_CHUNK_SIZE,
};
