//! Well-known shared-state keys.
//!
//! The engine treats these opaquely, but services rely on their presence
//! and shape, so the namespace is part of the external interface.

pub const COURSE_ID: &str = "courseId";
pub const FACULTY_ID: &str = "facultyId";
pub const LEARNER_ID: &str = "learnerId";
pub const CONTENT_SOURCE: &str = "contentSource";
pub const COURSE_METADATA: &str = "courseMetadata";
pub const CHUNKS: &str = "chunks";
pub const LEARNING_OBJECTIVES: &str = "learningObjectives";
pub const COURSE_STRUCTURE: &str = "courseStructure";
pub const KNOWLEDGE_GRAPH: &str = "knowledgeGraph";
pub const FACD: &str = "facd";
pub const FCCS: &str = "fccs";
pub const FFCS: &str = "ffcs";
pub const PERSONALIZED_LEARNING_TREE: &str = "personalizedLearningTree";
pub const FACULTY_FEEDBACK: &str = "facultyFeedback";
pub const REVIEW_TARGET: &str = "reviewTarget";
pub const METRICS_SCOPE: &str = "metricsScope";

// Approved artifacts wrap the promoted draft under a per-gate key
pub const APPROVED_COURSE_INITIALIZATION: &str = "approvedCourseInitialization";
pub const APPROVED_LEARNING_OBJECTIVES: &str = "approvedLearningObjectives";
pub const APPROVED_STRUCTURE: &str = "approvedStructure";
pub const APPROVED_KNOWLEDGE_GRAPH: &str = "approvedKnowledgeGraph";
pub const APPROVED_BY: &str = "approvedBy";
pub const APPROVED_AT: &str = "approvedAt";
