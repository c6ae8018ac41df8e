fn main() {
    // Only the app shell needs Tauri's codegen
    #[cfg(feature = "app")]
    tauri_build::build();
}
