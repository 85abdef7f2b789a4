pub mod accession;
pub mod cluster;
pub mod expression;
pub mod file;
pub mod metadata;
pub mod project;
pub mod study;
pub mod totat;
pub mod user;
pub mod user_annotation;

use super::Stored;

/// Collections paired with the fields that carry a unique index.
pub(super) fn unique_fields() -> [(&'static str, &'static [&'static str]); 14] {
    fn entry<T: Stored>() -> (&'static str, &'static [&'static str]) {
        (T::COLLECTION, T::UNIQUE)
    }

    [
        entry::<scp_core::model::study::Study>(),
        entry::<scp_core::model::accession::StudyAccession>(),
        entry::<scp_core::model::accession::StudyIdentifier>(),
        entry::<scp_core::model::cluster::ClusterGroup>(),
        entry::<scp_core::model::data_array::DataArray>(),
        entry::<scp_core::model::expression::ExpressionScore>(),
        entry::<scp_core::model::expression::PrecomputedScore>(),
        entry::<scp_core::model::file::StudyFile>(),
        entry::<scp_core::model::file::DirectoryListing>(),
        entry::<scp_core::model::metadata::StudyMetadatum>(),
        entry::<scp_core::model::project::ProjectMetadatum>(),
        entry::<scp_core::model::user_annotation::UserAnnotation>(),
        entry::<user::User>(),
        entry::<totat::Totat>(),
    ]
}
