pub mod aggregate;
pub mod features;
pub mod frame;
pub mod score;

pub use aggregate::{
    bucket_index, bucket_start, ParticipantAggregate, ProcessedMarker, TimeBucketSummary,
};
pub use features::{EmotionDistribution, FeatureSet, GazeVector, HeadPose, Landmarks, Point2};
pub use frame::{Frame, FrameKey, StorageEvent};
pub use score::{AnalysisRecord, EngagementScore, ResultObject, ScoreFactors};
