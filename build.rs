use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git").args(["describe", "--tags"]).output() {
        if output.status.success() {
            println!(
                "cargo:rustc-env=LUMEN_VERSION_ID=lumen {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
        }
    }
}
