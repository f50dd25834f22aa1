//! The `version` command

pub fn run() {
    println!("kubepack {}", env!("CARGO_PKG_VERSION"));
}
