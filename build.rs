use std::process::Command;

fn main() {
    // Release builds get DOTBOT_VERSION from CI; local builds fall back to git describe.
    if let Ok(version) = std::env::var("DOTBOT_VERSION") {
        println!("cargo:rustc-env=DOTBOT_VERSION={version}");
    } else if let Ok(output) = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        && output.status.success()
    {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=DOTBOT_VERSION=dev-{version}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=DOTBOT_VERSION");
}
