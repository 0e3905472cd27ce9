use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

// Cache-busting suffix for /static URLs, derived from the asset contents.
fn main() {
    println!("cargo:rerun-if-changed=static/");

    let mut hasher = DefaultHasher::new();

    let mut assets: Vec<_> = fs::read_dir(Path::new("static"))
        .map(|dir| dir.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default();
    assets.sort();

    for path in assets.iter().filter(|p| p.is_file()) {
        if let (Some(name), Ok(contents)) = (path.file_name(), fs::read(path)) {
            name.hash(&mut hasher);
            contents.hash(&mut hasher);
        }
    }

    let hash = format!("{:016x}", hasher.finish());
    println!("cargo:rustc-env=STATIC_HASH={}", &hash[..8]);
}
