//! Integration tests for the patch engine and release extraction.

mod encode_patch;
mod release_extract;
