// build.rs
fn main() {
    // Build info for --version
    vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
        .expect("Unable to generate build info");
}
