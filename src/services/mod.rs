pub mod attachments;
pub mod batch;
pub mod valuers;
