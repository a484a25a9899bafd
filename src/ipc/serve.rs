use std::io::{self, BufRead, Write};
use tracing::warn;

use super::error::bad_json;
use super::{handle_request, AppState, Request};

/// Answers one JSON line per request line until the input closes. Blank
/// lines are skipped. A read error ends the session like EOF does.
pub fn serve<R: BufRead, W: Write>(state: &mut AppState, input: R, output: &mut W) -> io::Result<()> {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(req) => handle_request(state, req),
            Err(e) => {
                warn!(error = %e, "unparseable request line");
                bad_json(e.to_string())
            }
        };
        writeln!(output, "{reply}")?;
        output.flush()?;
    }
    Ok(())
}
