use bitflags::bitflags;


/// Canonical single-letter codes of the negotiate flags, in bit order (bit 0 first).
///
/// Reserved positions carry an `r` prefix and count downwards, as in MS-NLMP.
pub static FLAG_CODES: [&str; 32] = [
    "A", "B", "C", "r10", "D", "E", "F", "G",
    "r9", "H", "r8", "J", "K", "L", "r7", "M",
    "N", "O", "r6", "P", "Q", "r5", "R", "S",
    "r4", "T", "r3", "r2", "r1", "U", "V", "W",
];

/// Descriptive names for a subset of the codes.
pub static FLAG_ALIASES: [(&str, &str); 7] = [
    ("request_target", "C"),
    ("negotiate_ntlm", "H"),
    ("negotiate_oem_domain_supplied", "K"),
    ("negotiate_oem_workstation_supplied", "L"),
    ("negotiate_always_sign", "M"),
    ("negotiate_target_info", "S"),
    ("negotiate_version", "T"),
];


bitflags! {
    /// The 32-bit capability vector exchanged in every NTLM message.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct NtlmFlags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const RESERVED_10 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LM_KEY = 0x0000_0080;
        const RESERVED_9 = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const RESERVED_8 = 0x0000_0400;
        const ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_OEM_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_OEM_WORKSTATION_SUPPLIED = 0x0000_2000;
        const RESERVED_7 = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const RESERVED_6 = 0x0004_0000;
        const NEGOTIATE_EXTENDED_SESSIONSECURITY = 0x0008_0000;
        const NEGOTIATE_IDENTIFY = 0x0010_0000;
        const RESERVED_5 = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const RESERVED_4 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const RESERVED_3 = 0x0400_0000;
        const RESERVED_2 = 0x0800_0000;
        const RESERVED_1 = 0x1000_0000;
        const NEGOTIATE_128 = 0x2000_0000;
        const NEGOTIATE_KEY_EXCH = 0x4000_0000;
        const NEGOTIATE_56 = 0x8000_0000;
    }
}


fn alias_matches(alias: &str, name: &str) -> bool {
    // hyphens and underscores are interchangeable in aliases
    alias.len() == name.len()
        && alias.bytes()
            .zip(name.bytes())
            .all(|(a, n)| a == n || (a == b'_' && n == b'-'))
}

/// Resolves a canonical code or an alias to its bit position.
fn bit_position(name: &str) -> Option<usize> {
    if let Some(position) = FLAG_CODES.iter().position(|code| *code == name) {
        return Some(position);
    }
    let (_alias, code) = FLAG_ALIASES.iter()
        .find(|(alias, _code)| alias_matches(alias, name))?;
    FLAG_CODES.iter().position(|c| c == code)
}

impl NtlmFlags {
    /// Builds a flag set from codes and aliases. Names that are neither are ignored.
    pub fn from_names<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let mut flags = Self::empty();
        for name in names {
            flags.set_by_name(name, true);
        }
        flags
    }

    /// Returns `None` if `name` is neither a canonical code nor an alias.
    pub fn get_by_name(&self, name: &str) -> Option<bool> {
        let position = bit_position(name)?;
        Some(self.bits() & (1 << position) != 0)
    }

    pub fn set_by_name(&mut self, name: &str, value: bool) {
        if let Some(position) = bit_position(name) {
            self.set(Self::from_bits_retain(1 << position), value);
        }
    }

    pub fn serialize(&self) -> u32 {
        self.bits()
    }

    pub fn deserialize(value: u32) -> Self {
        // all 32 positions are defined, so nothing is lost here
        Self::from_bits_retain(value)
    }

    /// Canonical codes of the set bits, lowest bit first.
    pub fn set_codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        FLAG_CODES.iter()
            .enumerate()
            .filter(|(position, _code)| self.bits() & (1 << position) != 0)
            .map(|(_position, code)| *code)
    }
}
