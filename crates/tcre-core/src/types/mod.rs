pub mod candidate;
pub mod record;

pub use candidate::{
    Candidate, CandidateClass, CandidateId, EntityMention, ENT_TYP_CK, ENT_TYP_CT, ENT_TYP_TF,
};
pub use record::FeatureRecord;
