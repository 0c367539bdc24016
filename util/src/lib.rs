//! Arithmetic helpers shared by `upgrade-lock`.
//!
//! These live in their own crate because they have nothing to do with locking:
//! they compute wait deadlines without wrapping around when a caller asks to
//! wait "forever".
#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod math;
