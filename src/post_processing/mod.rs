//! Post-processing of a downloaded index archive
//!
//! After the transfer the pipeline runs these stages in order:
//! 1. Extract - unpack the `.tar.bz2` into staging ([`Extractor`])
//! 2. Verify - compare the archive against its `.md5` file ([`ChecksumVerifier`])
//! 3. Publish - swap the extracted index into place ([`Publisher`])
//! 4. Cleanup - remove the staging directory ([`Publisher::clear_staging`])

mod extract;
mod publish;
mod verify;

pub use extract::{DATASET_DIR, Extractor, TarExtractor};
pub use publish::{DirectoryPublisher, Publisher};
pub use verify::{ChecksumVerifier, Md5Verifier, md5_file, parse_checksum_file};
