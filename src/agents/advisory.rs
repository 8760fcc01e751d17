use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use crate::telemetry::{EventPayload, TimelineStore};

pub const REG_SET_TAG: &str = "[REG_SET]";
pub const DNS_TAG: &str = "[DNS]";

/// Decodes one line of target output.
///
/// Only `[REG_SET] <detail>` and `[DNS] <domain>` are recognised. A tag with
/// nothing after it is still an advisory and carries an empty remainder.
pub fn parse_advisory(line: &str) -> Option<EventPayload> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(REG_SET_TAG) {
        return Some(EventPayload::RegSet { detail: rest.trim().to_string() });
    }

    if let Some(rest) = line.strip_prefix(DNS_TAG) {
        return Some(EventPayload::DnsQuery { domain: rest.trim().to_string() });
    }

    None
}

/// Reads `reader` to EOF, appending every advisory line to the timeline.
///
/// This is what keeps the child's pipe from filling up, so it has to run
/// while the target runs. Returns the number of advisories recorded. Bytes
/// that aren't valid UTF-8 are replaced rather than ending the drain.
pub async fn drain_advisories<R>(reader: R, timeline: &TimelineStore) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut recorded = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(payload) = parse_advisory(&line) {
                    debug!(kind = %payload.kind(), "advisory line");
                    timeline.append(payload);
                    recorded += 1;
                }
            }
            Err(e) => {
                warn!("Output stream read failed: {}", e);
                break;
            }
        }
    }

    recorded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_advisory_keeps_detail() {
        let payload = parse_advisory("[REG_SET] HKCU\\Software\\TestApp\\Run=C:\\agent.exe\r\n");
        assert_eq!(
            payload,
            Some(EventPayload::RegSet { detail: "HKCU\\Software\\TestApp\\Run=C:\\agent.exe".into() })
        );
    }

    #[test]
    fn dns_advisory_keeps_domain() {
        assert_eq!(
            parse_advisory("[DNS] cdn-updates.example"),
            Some(EventPayload::DnsQuery { domain: "cdn-updates.example".into() })
        );
    }

    #[test]
    fn unknown_lines_are_dropped() {
        assert_eq!(parse_advisory("hello world"), None);
        assert_eq!(parse_advisory("[REG_ERR] access denied"), None);
        assert_eq!(parse_advisory("prefix [DNS] example.com"), None);
        assert_eq!(parse_advisory(""), None);
    }

    #[test]
    fn bare_tag_keeps_an_empty_remainder() {
        assert_eq!(parse_advisory("[DNS]   "), Some(EventPayload::DnsQuery { domain: String::new() }));
        assert_eq!(parse_advisory("[REG_SET]"), Some(EventPayload::RegSet { detail: String::new() }));
    }

    #[tokio::test]
    async fn drain_reads_until_eof() {
        let timeline = TimelineStore::new();
        let output: &[u8] = b"starting\n[DNS] a.example\n\xff\xfe garbage\n[REG_SET] k=v\n[DNS] b.example";
        let recorded = drain_advisories(output, &timeline).await;

        assert_eq!(recorded, 3);
        let kinds: Vec<_> = timeline.snapshot().iter().map(|e| e.kind().as_str()).collect();
        assert_eq!(kinds, vec!["dns_query", "reg_set", "dns_query"]);
    }
}
