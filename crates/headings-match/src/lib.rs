pub mod calibrate;
pub mod matcher;

pub use calibrate::{merge_calibrated, CalibratedCandidate, ScoreCalibration};
pub use matcher::{AuthorityMatcher, MatchOptions, TopicMatches, VocabularyMatches};
