//! Cisco platform definitions (IOS, IOS-XE, IOS-XR, NX-OS, ASA).
//!
//! All five share the same two-level prompt model:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! edge1>                         # exec mode
//! edge1#                         # privilege_exec mode
//! RP/0/RP0/CPU0:xr1#             # IOS-XR
//! asa/pri/act#                   # ASA failover pair
//! ```
//!
//! Configuration mode prompts (`edge1(config)#`) are never entered during a
//! backup and match neither level.

use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Command every Cisco platform uses to print its running configuration.
pub const SHOW_RUNNING_CONFIG: &str = "show running-config";

/// Device types with built-in support, in catalog order.
pub const DEVICE_TYPES: [&str; 5] = [
    "cisco_ios",
    "cisco_xe",
    "cisco_xr",
    "cisco_nxos",
    "cisco_asa",
];

/// Build the shared exec/privilege_exec skeleton for a Cisco device type.
fn base(name: &str) -> PlatformDefinition {
    let exec = PrivilegeLevel::new("exec", r"(?m)^[\w.\-@()/:]{1,63}>\s?$").unwrap();

    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?m)^[\w.\-@/:]{1,63}#\s?$")
        .unwrap()
        .with_parent("exec")
        .with_escalate("enable")
        .with_auth(r"(?mi)^password:\s?$")
        .unwrap()
        .with_not_contains("(config");

    PlatformDefinition::new(name, SHOW_RUNNING_CONFIG)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Unknown command")
        .with_terminal_size(511, 24)
}

/// Cisco IOS.
pub fn ios() -> PlatformDefinition {
    base("cisco_ios")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511")
}

/// Cisco IOS-XE.
pub fn xe() -> PlatformDefinition {
    base("cisco_xe")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511")
}

/// Cisco IOS-XR.
pub fn xr() -> PlatformDefinition {
    base("cisco_xr")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511")
}

/// Cisco NX-OS.
pub fn nxos() -> PlatformDefinition {
    base("cisco_nxos")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511")
}

/// Cisco ASA. Paging is controlled with `terminal pager`.
pub fn asa() -> PlatformDefinition {
    base("cisco_asa").with_on_open_command("terminal pager 0")
}

/// All built-in Cisco platforms.
pub fn platforms() -> Vec<PlatformDefinition> {
    vec![ios(), xe(), xr(), nxos(), asa()]
}
