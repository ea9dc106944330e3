use crate::dataset::UserId;

#[derive(Debug, Clone, PartialEq)]
pub enum RecommendError {
    UnknownUser(UserId),
    UnknownMethod(String),
    DegenerateNeighbourhood(UserId),
}

impl std::fmt::Display for RecommendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendError::UnknownUser(u) => write!(f, "User ID {} not found in the dataset", u),
            RecommendError::UnknownMethod(m) => write!(f, "Unknown recommendation method: {}", m),
            RecommendError::DegenerateNeighbourhood(u) => {
                write!(f, "User ID {} has no similar users to draw ratings from", u)
            }
        }
    }
}

impl std::error::Error for RecommendError {}
