//! Default configuration values

/// Default configuration as TOML (for reference/documentation)
pub const DEFAULT_CONFIG_TOML: &str = r##"
# stackdeck terminal configuration

[tabs]
# Concurrent terminal tabs; opening one more is refused with a warning
max_tabs = 5

[session]
# Working directory when a tab is opened without one (default: ~/Sites)
# default_workspace = "/home/me/Sites"
initial_cols = 80
initial_rows = 24
# Wait after spawn before typing an initial command. This is a guess at
# when the shell prompt is ready, not a guarantee: slow shell startup can
# still lose or garble the command.
warmup_delay_ms = 300

[fit]
# Let the layout finish before measuring the active terminal
settle_delay_ms = 50
cell_width_px = 8.0
cell_height_px = 17.0
padding_px = 0.0

[host]
# unix:///path/to/socket or tcp://host:port (default: runtime socket)
# address = "tcp://127.0.0.1:7420"
request_timeout_secs = 10

[quick_commands]
# JSON file replacing the built-in catalog
# catalog_path = "/home/me/.config/stackdeck/quick-commands.json"
"##;
