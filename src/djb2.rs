/// Hashes a group name the way reference indexes store name hashes.
///
/// This is the client's variant of djb2: `hash * 31 + byte`, starting from
/// zero and wrapping on overflow.
pub fn djb2_hash<T: AsRef<str>>(string: T) -> u32 {
    string
        .as_ref()
        .bytes()
        .fold(0u32, |hash, c| {
            (hash << 5).wrapping_sub(hash).wrapping_add(c as u32)
        })
}
