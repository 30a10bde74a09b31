//! Persistence seam between the engine and a backend

use crate::annotation::{Annotation, PageAnnotations};

/// Loads and saves the annotation set of one document for one user
///
/// Implementations decide the transport; the engine only forwards errors.
pub trait AnnotationStore {
    type Error: std::error::Error + 'static;

    /// All annotations of `file_id`, grouped by page in stored order
    fn load(&self, file_id: u64, user_id: u64) -> Result<PageAnnotations, Self::Error>;

    /// Replace the stored set with `annotations` (bulk upsert)
    fn save(&self, file_id: u64, user_id: u64, annotations: &[Annotation]) -> Result<(), Self::Error>;
}

impl<S: AnnotationStore + ?Sized> AnnotationStore for &S {
    type Error = S::Error;

    fn load(&self, file_id: u64, user_id: u64) -> Result<PageAnnotations, Self::Error> {
        (**self).load(file_id, user_id)
    }

    fn save(&self, file_id: u64, user_id: u64, annotations: &[Annotation]) -> Result<(), Self::Error> {
        (**self).save(file_id, user_id, annotations)
    }
}
