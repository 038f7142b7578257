use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=ASCEND_TOOLKIT_HOME");
    println!("cargo:rerun-if-env-changed=ACL_LIB_DIR");
    println!("cargo:rerun-if-env-changed=RKNN_LIB_DIR");

    let acl = env::var("CARGO_FEATURE_ACL").is_ok();
    let rknn = env::var("CARGO_FEATURE_RKNN").is_ok();

    if !acl && !rknn {
        // Nothing to link: only the simulated backend is usable.
        return;
    }

    if acl {
        match find_acl_lib_dir() {
            Some(dir) => println!("cargo:rustc-link-search=native={}", dir.display()),
            None => println!(
                "cargo:warning=libascendcl not found, set ASCEND_TOOLKIT_HOME or ACL_LIB_DIR"
            ),
        }
        println!("cargo:rustc-link-lib=ascendcl");
    }

    if rknn {
        match find_rknn_lib_dir() {
            Some(dir) => println!("cargo:rustc-link-search=native={}", dir.display()),
            None => println!("cargo:warning=librknnrt not found, set RKNN_LIB_DIR"),
        }
        println!("cargo:rustc-link-lib=rknnrt");
    }
}

/// Find the directory holding libascendcl.so.
fn find_acl_lib_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("ACL_LIB_DIR") {
        let p = PathBuf::from(dir);
        if p.exists() {
            return Some(p);
        }
    }

    let mut candidates = Vec::new();
    if let Ok(home) = env::var("ASCEND_TOOLKIT_HOME") {
        candidates.push(PathBuf::from(&home).join("lib64"));
        candidates.push(PathBuf::from(&home).join("acllib/lib64"));
    }
    for dir in [
        "/usr/local/Ascend/ascend-toolkit/latest/lib64",
        "/usr/local/Ascend/ascend-toolkit/latest/acllib/lib64",
    ] {
        candidates.push(PathBuf::from(dir));
    }

    candidates
        .into_iter()
        .find(|p| p.join("libascendcl.so").exists())
}

/// Find the directory holding librknnrt.so.
fn find_rknn_lib_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("RKNN_LIB_DIR") {
        let p = PathBuf::from(dir);
        if p.exists() {
            return Some(p);
        }
    }

    ["/usr/lib", "/usr/lib/aarch64-linux-gnu", "/usr/local/lib"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.join("librknnrt.so").exists())
}
