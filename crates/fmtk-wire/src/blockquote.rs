//! Long-bracket quoting for embedding binary payloads in a command line.

/// Wrap `payload` as `[=*[payload]=*]`, choosing enough `=` that no sequence
/// inside the payload can close the bracket early.
pub fn block_quote(payload: &[u8]) -> Vec<u8> {
    let pad = required_pad(payload);
    let mut out = Vec::with_capacity(payload.len() + 4 + 2 * pad);
    out.push(b'[');
    out.extend(std::iter::repeat(b'=').take(pad));
    out.push(b'[');
    out.extend_from_slice(payload);
    out.push(b']');
    out.extend(std::iter::repeat(b'=').take(pad));
    out.push(b']');
    out
}

/// Same as [`block_quote`] for text.
pub fn block_quote_str(payload: &str) -> String {
    String::from_utf8_lossy(&block_quote(payload.as_bytes())).into_owned()
}

/// One more `=` than the longest `]=*]` run, or than a `]=*` run the payload
/// ends with. Zero when neither occurs.
fn required_pad(payload: &[u8]) -> usize {
    let mut longest: Option<usize> = None;
    let mut i = 0;
    while i < payload.len() {
        if payload[i] != b']' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < payload.len() && payload[j] == b'=' {
            j += 1;
        }
        let run = j - i - 1;
        if j == payload.len() || payload[j] == b']' {
            longest = Some(longest.map_or(run, |l| l.max(run)));
        }
        // The closing `]` may open the next run.
        i = j;
    }
    longest.map_or(0, |l| l + 1)
}
