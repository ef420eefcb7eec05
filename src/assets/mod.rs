//! Asset Upload
//!
//! Validation, optional re-encoding and upload of image assets to the
//! managed blob store.

pub mod codec;
pub mod uploader;

pub use codec::{content_type_of, encode_jpeg, extension_for, EncodedImage};
pub use uploader::{AssetFile, AssetUploader, UploadMeta, UploadResult, UploaderConfig};
