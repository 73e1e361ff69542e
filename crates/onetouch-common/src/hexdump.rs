//! Trace-formatting helpers, standing in for the original driver's
//! `xstrdup_hexdump`/`xstrdup_asciify`.

pub fn hexdump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn asciify(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hexdump_formats_lowercase_pairs() {
        assert_eq!(hexdump(&[0x02, 0x06, 0x08, 0x03]), "02 06 08 03");
    }

    #[test]
    fn asciify_masks_non_printable_bytes() {
        assert_eq!(asciify(&[b'h', b'i', 0x02, b'!']), "hi.!");
    }
}
