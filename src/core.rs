pub mod alignment_policy;
pub mod depth_record;
pub mod run_compressor;
pub mod segment;
