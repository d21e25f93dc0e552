//! bundlecopy CLI - copy bundles and images between registries and tar archives.

pub mod commands;
