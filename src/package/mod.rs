pub mod ig_package;

pub use ig_package::{IgPackage, PackageManifest};
