/// One inbound socket chunk after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk<'a> {
    /// The freshest whole realtime frame in the chunk.
    Realtime(&'a [u8]),
    Text(String),
}

/// Classifies a chunk read from a robot socket.
///
/// The first four bytes are read as a big-endian frame length. A chunk whose
/// total length is a whole multiple of that length is realtime data; when it
/// carries several frames only the last one is kept. Everything else is text,
/// decoded as UTF-8 with invalid sequences replaced.
pub fn classify(chunk: &[u8]) -> Chunk<'_> {
    if let Some(prefix) = chunk.get(..4) {
        let frame_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if frame_len > 0 && chunk.len() % frame_len == 0 {
            return Chunk::Realtime(&chunk[chunk.len() - frame_len..]);
        }
    }
    Chunk::Text(String::from_utf8_lossy(chunk).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_chunks_are_text() {
        assert_eq!(classify(b"ok\n"), Chunk::Text("ok\n".to_string()));
        assert_eq!(classify(b""), Chunk::Text(String::new()));
    }

    #[test]
    fn zero_prefix_is_text() {
        let chunk = [0u8, 0, 0, 0, 1, 2];
        assert!(matches!(classify(&chunk), Chunk::Text(_)));
    }

    #[test]
    fn coalesced_frames_keep_the_last() {
        let mut chunk = vec![0, 0, 0, 6, 1, 1];
        chunk.extend_from_slice(&[0, 0, 0, 6, 2, 2]);
        assert_eq!(classify(&chunk), Chunk::Realtime(&[0, 0, 0, 6, 2, 2]));
    }
}
