//! Command dispatch.

use super::invocation::{CommandKind, Invocation};

/// Output of `help`.
pub const HELP_TEXT: &str = "Available commands: whoami, fastfetch, help, exit\n";

/// Output of `exit`.
pub const FAREWELL: &str = "Goodbye!\n";

/// Output of `fastfetch`.
pub const FASTFETCH_BANNER: &str = r#"
       .
      / \
     /   \      guest@sandbox
    /     \     -------------
   /_______\    OS: Sandbox OS
  /         \   Host: ssh-sandbox
 /___________\  Kernel: 1.0.0-sandbox
                Uptime: Forever
                Packages: 0
                Shell: ssh-sandbox
                Terminal: SSH
                CPU: Virtual CPU
                Memory: 100MiB / 1GiB

Nothing here persists. Type 'help' to see what you can do.
"#;

/// Resolve one input line for `principal`.
///
/// Never fails: empty input yields empty output and unknown commands yield
/// a "command not found" line. `exit` only returns the farewell text;
/// ending the session is up to the caller.
pub fn resolve(input: &str, principal: &str) -> String {
    let Some(invocation) = Invocation::parse(input) else {
        return String::new();
    };

    match invocation.kind() {
        CommandKind::Whoami => format!("{}\n", principal),
        CommandKind::Fastfetch => FASTFETCH_BANNER.to_string(),
        CommandKind::Help => HELP_TEXT.to_string(),
        CommandKind::Exit => FAREWELL.to_string(),
        CommandKind::NotFound(name) => format!("command not found: {}\n", name),
    }
}
