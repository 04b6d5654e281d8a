use tokio::process::Command;
use tracing::debug;

use crate::error::PreflightError;
use crate::scanner::NmapProbe;
use crate::transfer::Rsync;
use crate::types::ProbeKind;

/// First rsync release with `--info=progress2`.
pub const MIN_RSYNC: (u32, u32, u32) = (3, 1, 0);

/// Check that the collaborators this run needs are present and new enough.
pub async fn check(probe: ProbeKind) -> Result<(), PreflightError> {
    let text = version_output(Rsync::TOOL).await?;
    let found =
        parse_rsync_version(&text).ok_or(PreflightError::Unparseable { tool: Rsync::TOOL })?;
    debug!(?found, "rsync version");
    if found < MIN_RSYNC {
        return Err(PreflightError::Outdated {
            tool: Rsync::TOOL,
            found: dotted(found),
            required: dotted(MIN_RSYNC),
        });
    }
    if probe == ProbeKind::Nmap {
        version_output(NmapProbe::TOOL).await?;
    }
    Ok(())
}

async fn version_output(tool: &'static str) -> Result<String, PreflightError> {
    let output = Command::new(tool)
        .arg("--version")
        .output()
        .await
        .map_err(|e| {
            debug!(tool, "spawn failed: {e}");
            PreflightError::Missing { tool }
        })?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pull `major.minor.patch` out of `rsync --version` output.
///
/// Handles `rsync  version 3.2.7  protocol version 31`, `version v3.4.1`
/// and the `rsync version 2.6.9 compatible` line printed by openrsync.
pub fn parse_rsync_version(text: &str) -> Option<(u32, u32, u32)> {
    text.lines()
        .filter(|line| line.contains("rsync"))
        .find_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            // "protocol version N" is the wire protocol, not the release.
            let at = (0..tokens.len())
                .find(|&i| tokens[i] == "version" && (i == 0 || tokens[i - 1] != "protocol"))?;
            parse_dotted(tokens.get(at + 1)?)
        })
}

fn parse_dotted(token: &str) -> Option<(u32, u32, u32)> {
    let token = token.trim_start_matches('v');
    let mut parts = token.split('.').map(|p| {
        let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<u32>().ok()
    });
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

fn dotted((major, minor, patch): (u32, u32, u32)) -> String {
    format!("{major}.{minor}.{patch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samba_rsync() {
        let text = "rsync  version 3.2.7  protocol version 31\n\
                    Copyright (C) 1996-2022 by Andrew Tridgell, Wayne Davison, and others.\n";
        assert_eq!(parse_rsync_version(text), Some((3, 2, 7)));
    }

    #[test]
    fn v_prefixed() {
        assert_eq!(
            parse_rsync_version("rsync  version v3.4.1  protocol version 32\n"),
            Some((3, 4, 1))
        );
    }

    #[test]
    fn openrsync_reports_old_compat_version() {
        let text = "openrsync: protocol version 29\nrsync version 2.6.9 compatible\n";
        let found = parse_rsync_version(text).unwrap();
        assert_eq!(found, (2, 6, 9));
        assert!(found < MIN_RSYNC);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_rsync_version("command not found"), None);
    }
}
