/*!
Table-driven instruction decoder framework.

Every CPU core uses the same scheme: a static list of instruction
descriptors (mask/icode pairs plus a handler) is compiled once at CPU
construction into a dispatch table indexed by a per-ISA key extracted from
the opcode. At runtime a fetch is one or two array lookups, never a scan.

Descriptor semantics
--------------------
A descriptor matches opcode `O` iff `(O & mask) == icode`, after mask and
icode have been left-aligned to the widest instruction of the ISA (so the
lookup key space is uniform for variable-length encodings). Among several
matching descriptors the most specific wins: the one whose mask has the
most set bits. Exact ties are a configuration error and are diagnosed at
build time, as are cross-matching descriptor pairs. Opcodes matching no
descriptor resolve to the designated `undefined` descriptor, never to a
hole.

Two-level dispatch
------------------
When a first-level slot cannot discriminate (some matching descriptor
needs opcode bits beyond the key), the slot holds a 256-entry sub-table
indexed by the next 8 opcode bits. Sub-tables are only available for
`top_bits` keys; a scattered-bit key must fully cover its descriptors'
masks.

Existence predicates
--------------------
An optional per-descriptor predicate is evaluated at build time with the
reconstructed opcode. It can veto encodings (addressing-mode combinations
that do not exist) and reports the number of memory accesses the encoding
performs, which feeds the per-access cycle adjustment.

`lookup_linear` re-resolves an opcode by scanning the descriptor list; the
table and the scan must agree for every representable opcode, which is
what the decoder test suites verify.
*/

use thiserror::Error;

/// Existence predicate: `None` vetoes the encoding, `Some(n)` accepts it
/// with `n` memory accesses.
pub type ExistsProc<H> = fn(&InstrDesc<H>, u32) -> Option<u8>;

/// Static instruction descriptor, one per encoding family.
#[derive(Copy, Clone, Debug)]
pub struct InstrDesc<H> {
    pub mask: u32,
    pub icode: u32,
    pub name: &'static str,
    pub handler: H,
    /// Instruction length in ISA units (bytes, halfwords or words).
    pub len: u8,
    pub cycles: u32,
    pub exists: Option<ExistsProc<H>>,
}

impl<H> InstrDesc<H> {
    pub const fn new(
        mask: u32,
        icode: u32,
        name: &'static str,
        handler: H,
        len: u8,
        cycles: u32,
    ) -> Self {
        Self {
            mask,
            icode,
            name,
            handler,
            len,
            cycles,
            exists: None,
        }
    }
}

/// A table entry after resolution: what dispatch hands to the CPU loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInstr<H> {
    pub name: &'static str,
    pub handler: H,
    pub len: u8,
    pub cycles: u32,
    pub mem_accesses: u8,
}

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("descriptor \"{name}\" (icode {icode:#x}): {reason}")]
    InvalidDescriptor {
        name: &'static str,
        icode: u32,
        reason: String,
    },
    #[error(
        "cross match between \"{a}\" (icode {a_icode:#x}) and \"{b}\" (icode {b_icode:#x})"
    )]
    CrossMatch {
        a: &'static str,
        a_icode: u32,
        b: &'static str,
        b_icode: u32,
    },
    #[error("ambiguous dispatch at opcode {opcode:#x}: \"{a}\" vs \"{b}\"")]
    Ambiguous {
        opcode: u32,
        a: &'static str,
        b: &'static str,
    },
}

#[derive(Debug)]
enum KeyKind {
    /// Key is the top `key_bits` of the left-aligned opcode word.
    TopBits,
    /// Scattered-bit extraction for fixed-length ISAs. `expand` must be
    /// the inverse of `extract` on the covered bits.
    Custom {
        extract: fn(u32) -> u32,
        expand: fn(u32) -> u32,
        key_mask: u32,
    },
}

/// Per-ISA description of the dispatch index.
#[derive(Debug)]
pub struct KeySpec {
    unit_bits: u8,
    max_len: u8,
    key_bits: u8,
    kind: KeyKind,
}

impl KeySpec {
    /// Key formed from the leading `key_bits` of the opcode. The usual
    /// choice for byte-unit ISAs (full first byte or first two bytes).
    pub fn top_bits(unit_bits: u8, max_len: u8, key_bits: u8) -> Self {
        debug_assert!(unit_bits as u32 * max_len as u32 <= 32);
        debug_assert!(key_bits as u32 <= unit_bits as u32 * max_len as u32);
        Self {
            unit_bits,
            max_len,
            key_bits,
            kind: KeyKind::TopBits,
        }
    }

    /// Scattered-bit key for fixed-length ISAs (single unit). `key_mask`
    /// names the opcode bits the key covers.
    pub fn scattered(
        unit_bits: u8,
        key_bits: u8,
        extract: fn(u32) -> u32,
        expand: fn(u32) -> u32,
        key_mask: u32,
    ) -> Self {
        Self {
            unit_bits,
            max_len: 1,
            key_bits,
            kind: KeyKind::Custom {
                extract,
                expand,
                key_mask,
            },
        }
    }

    fn word_bits(&self) -> u32 {
        self.unit_bits as u32 * self.max_len as u32
    }

    fn key_mask(&self) -> u32 {
        match &self.kind {
            KeyKind::TopBits => {
                let m = ((1u64 << self.key_bits) - 1) as u32;
                m << (self.word_bits() - self.key_bits as u32)
            }
            KeyKind::Custom { key_mask, .. } => *key_mask,
        }
    }

    /// Bits covered by a second-level sub-index: the 8 bits right below
    /// the first-level key. Zero when the word has no room for them.
    fn sub_mask(&self) -> u32 {
        match &self.kind {
            KeyKind::TopBits if self.word_bits() >= self.key_bits as u32 + 8 => {
                0xff << (self.word_bits() - self.key_bits as u32 - 8)
            }
            _ => 0,
        }
    }

    fn sub_shift(&self) -> u32 {
        self.word_bits() - self.key_bits as u32 - 8
    }

    fn extract(&self, opcode: u32) -> u32 {
        match &self.kind {
            KeyKind::TopBits => opcode >> (self.word_bits() - self.key_bits as u32),
            KeyKind::Custom { extract, .. } => extract(opcode),
        }
    }

    fn expand(&self, key: u32) -> u32 {
        match &self.kind {
            KeyKind::TopBits => key << (self.word_bits() - self.key_bits as u32),
            KeyKind::Custom { expand, .. } => expand(key),
        }
    }

    fn nr_keys(&self) -> usize {
        1usize << self.key_bits
    }
}

#[derive(Debug)]
enum Slot<H> {
    Instr(ResolvedInstr<H>),
    Sub(Box<[ResolvedInstr<H>]>),
}

/// A built dispatch table plus the aligned descriptor list it came from.
#[derive(Debug)]
pub struct Decoder<H: Copy> {
    key: KeySpec,
    slots: Vec<Slot<H>>,
    /// Left-aligned descriptors, for the linear reference resolution.
    descs: Vec<InstrDesc<H>>,
    undefined: InstrDesc<H>,
    access_cycles: fn(u8) -> u32,
    cycle_multiplier: u32,
}

/// Staged configuration for `Decoder` construction.
pub struct DecoderBuilder<H: Copy> {
    key: KeySpec,
    descs: Vec<InstrDesc<H>>,
    undefined: InstrDesc<H>,
    access_cycles: fn(u8) -> u32,
    cycle_multiplier: u32,
}

impl<H: Copy> DecoderBuilder<H> {
    pub fn new(key: KeySpec, descs: &[InstrDesc<H>], undefined: InstrDesc<H>) -> Self {
        Self {
            key,
            descs: descs.to_vec(),
            undefined,
            access_cycles: |_| 0,
            cycle_multiplier: 1,
        }
    }

    /// Extra cycles charged per memory access reported by an existence
    /// predicate.
    pub fn access_cycles(mut self, f: fn(u8) -> u32) -> Self {
        self.access_cycles = f;
        self
    }

    /// Scale every installed cycle count (machine-cycle ISAs such as the
    /// MCS-51 run several oscillator periods per machine cycle).
    pub fn cycle_multiplier(mut self, m: u32) -> Self {
        self.cycle_multiplier = m;
        self
    }

    pub fn build(mut self) -> Result<Decoder<H>, DecoderError> {
        self.validate_and_align()?;
        self.check_cross_matches()?;
        let decoder = Decoder {
            slots: Vec::with_capacity(self.key.nr_keys()),
            key: self.key,
            descs: self.descs,
            undefined: self.undefined,
            access_cycles: self.access_cycles,
            cycle_multiplier: self.cycle_multiplier,
        };
        decoder.fill_slots()
    }

    fn validate_and_align(&mut self) -> Result<(), DecoderError> {
        let word_bits = self.key.word_bits();
        let covered = self.key.key_mask() | self.key.sub_mask();
        for desc in &mut self.descs {
            let (name, icode) = (desc.name, desc.icode);
            let invalid = move |reason: String| DecoderError::InvalidDescriptor {
                name,
                icode,
                reason,
            };
            if desc.len == 0 || desc.len > self.key.max_len {
                return Err(invalid(format!("length {} out of range", desc.len)));
            }
            if desc.mask == 0 {
                return Err(invalid("empty mask matches everything".to_string()));
            }
            if desc.icode & desc.mask != desc.icode {
                return Err(invalid("icode carries bits outside the mask".to_string()));
            }
            let instr_bits = desc.len as u32 * self.key.unit_bits as u32;
            if instr_bits < 32 && (desc.mask >> instr_bits != 0 || desc.icode >> instr_bits != 0)
            {
                return Err(invalid(format!(
                    "mask/icode exceed the declared {} unit(s)",
                    desc.len
                )));
            }
            // Uniform left alignment, keyed off the descriptor length.
            let shift = word_bits - instr_bits;
            desc.mask <<= shift;
            desc.icode <<= shift;
            if desc.mask & !covered != 0 {
                return Err(invalid(
                    "mask needs bits beyond two-level dispatch".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Two descriptors that mutually match with equally specific masks can
    /// never be ordered; reject the list.
    fn check_cross_matches(&self) -> Result<(), DecoderError> {
        for (i, a) in self.descs.iter().enumerate() {
            for b in &self.descs[i + 1..] {
                let mutual = (a.icode & b.mask) == b.icode && (b.icode & a.mask) == a.icode;
                if mutual && a.mask.count_ones() == b.mask.count_ones() {
                    return Err(DecoderError::CrossMatch {
                        a: a.name,
                        a_icode: a.icode,
                        b: b.name,
                        b_icode: b.icode,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<H: Copy> Decoder<H> {
    fn fill_slots(mut self) -> Result<Self, DecoderError> {
        let key_mask = self.key.key_mask();
        let mut slots = Vec::with_capacity(self.key.nr_keys());
        for k in 0..self.key.nr_keys() as u32 {
            let base = self.key.expand(k);
            let mut needs_sub = false;
            let mut best: Option<&InstrDesc<H>> = None;
            let mut best_access = 0u8;
            for desc in &self.descs {
                if (base & desc.mask & key_mask) != (desc.icode & key_mask) {
                    continue;
                }
                // A descriptor needing bits beyond the key cannot be
                // resolved here. The same goes for existence predicates
                // when a second opcode unit is available: they may depend
                // on bits the key does not cover.
                if desc.mask & !key_mask != 0
                    || (desc.exists.is_some() && self.key.sub_mask() != 0)
                {
                    needs_sub = true;
                    continue;
                }
                let access = match desc.exists {
                    Some(check) => match check(desc, base) {
                        Some(n) => n,
                        None => continue,
                    },
                    None => 0,
                };
                match best {
                    None => {
                        best = Some(desc);
                        best_access = access;
                    }
                    Some(prev) => {
                        if desc.mask.count_ones() > prev.mask.count_ones() {
                            best = Some(desc);
                            best_access = access;
                        } else if desc.mask.count_ones() == prev.mask.count_ones() {
                            return Err(DecoderError::Ambiguous {
                                opcode: base,
                                a: prev.name,
                                b: desc.name,
                            });
                        }
                    }
                }
            }
            let slot = if needs_sub {
                Slot::Sub(self.build_sub_table(base)?)
            } else {
                let (desc, access) = match best {
                    Some(d) => (d, best_access),
                    None => (&self.undefined, 0),
                };
                Slot::Instr(self.resolve(desc, access))
            };
            slots.push(slot);
        }
        self.slots = slots;
        Ok(self)
    }

    fn build_sub_table(&self, base: u32) -> Result<Box<[ResolvedInstr<H>]>, DecoderError> {
        let full_mask = self.key.key_mask() | self.key.sub_mask();
        let shift = self.key.sub_shift();
        let mut tab = Vec::with_capacity(256);
        for sub in 0u32..256 {
            let opcode = base | (sub << shift);
            let mut best: Option<&InstrDesc<H>> = None;
            let mut best_access = 0u8;
            for desc in &self.descs {
                if (opcode & desc.mask) != desc.icode {
                    continue;
                }
                debug_assert_eq!(desc.mask & !full_mask, 0);
                let access = match desc.exists {
                    Some(check) => match check(desc, opcode) {
                        Some(n) => n,
                        None => continue,
                    },
                    None => 0,
                };
                match best {
                    None => {
                        best = Some(desc);
                        best_access = access;
                    }
                    Some(prev) => {
                        if desc.mask.count_ones() > prev.mask.count_ones() {
                            best = Some(desc);
                            best_access = access;
                        } else if desc.mask.count_ones() == prev.mask.count_ones() {
                            return Err(DecoderError::Ambiguous {
                                opcode,
                                a: prev.name,
                                b: desc.name,
                            });
                        }
                    }
                }
            }
            let (desc, access) = match best {
                Some(d) => (d, best_access),
                None => (&self.undefined, 0),
            };
            tab.push(self.resolve(desc, access));
        }
        Ok(tab.into_boxed_slice())
    }

    fn resolve(&self, desc: &InstrDesc<H>, mem_accesses: u8) -> ResolvedInstr<H> {
        let cycles =
            (desc.cycles + (self.access_cycles)(mem_accesses)) * self.cycle_multiplier;
        ResolvedInstr {
            name: desc.name,
            handler: desc.handler,
            len: desc.len,
            cycles,
            mem_accesses,
        }
    }

    /// O(1) dispatch: first-level key, then an optional sub-index.
    #[inline]
    pub fn lookup(&self, opcode: u32) -> &ResolvedInstr<H> {
        let k = self.key.extract(opcode);
        match &self.slots[k as usize] {
            Slot::Instr(instr) => instr,
            Slot::Sub(tab) => {
                let sub = (opcode >> self.key.sub_shift()) & 0xff;
                &tab[sub as usize]
            }
        }
    }

    /// Reference resolution by linear scan over the descriptor list;
    /// must agree with `lookup` for every opcode.
    pub fn lookup_linear(&self, opcode: u32) -> ResolvedInstr<H> {
        let mut best: Option<&InstrDesc<H>> = None;
        let mut best_access = 0u8;
        for desc in &self.descs {
            if (opcode & desc.mask) != desc.icode {
                continue;
            }
            let access = match desc.exists {
                Some(check) => match check(desc, opcode) {
                    Some(n) => n,
                    None => continue,
                },
                None => 0,
            };
            let better = match best {
                None => true,
                Some(prev) => desc.mask.count_ones() > prev.mask.count_ones(),
            };
            if better {
                best = Some(desc);
                best_access = access;
            }
        }
        match best {
            Some(d) => self.resolve(d, best_access),
            None => self.resolve(&self.undefined, 0),
        }
    }

    /// Number of second-level tables the build installed.
    pub fn nr_sub_tables(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Sub(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Desc = InstrDesc<u32>;

    const UND: Desc = Desc {
        mask: 0,
        icode: 0,
        name: "und",
        handler: 0,
        len: 1,
        cycles: 1,
        exists: None,
    };

    fn byte_key() -> KeySpec {
        KeySpec::top_bits(8, 1, 8)
    }

    #[test]
    fn duplicate_descriptor_is_fatal() {
        let list = [
            Desc::new(0xff, 0x00, "nop", 1, 1, 1),
            Desc::new(0xff, 0x00, "dup", 2, 1, 1),
        ];
        let err = DecoderBuilder::new(byte_key(), &list, UND)
            .build()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nop") && msg.contains("dup"), "{msg}");
    }

    #[test]
    fn most_specific_wins() {
        let list = [
            Desc::new(0xf0, 0x10, "generic", 1, 1, 1),
            Desc::new(0xff, 0x15, "specific", 2, 1, 1),
        ];
        let dec = DecoderBuilder::new(byte_key(), &list, UND).build().unwrap();
        assert_eq!(dec.lookup(0x15).name, "specific");
        assert_eq!(dec.lookup(0x11).name, "generic");
        assert_eq!(dec.lookup(0x25).name, "und");
    }

    #[test]
    fn unmatched_opcodes_get_undefined_not_a_hole() {
        let list = [Desc::new(0xff, 0x42, "only", 1, 1, 1)];
        let dec = DecoderBuilder::new(byte_key(), &list, UND).build().unwrap();
        for op in 0u32..=0xff {
            let instr = dec.lookup(op);
            if op == 0x42 {
                assert_eq!(instr.name, "only");
            } else {
                assert_eq!(instr.name, "und");
            }
        }
    }

    #[test]
    fn cross_match_with_unequal_popcount_is_ordered() {
        // "wide" covers "narrow"'s icode but not vice versa: resolvable.
        let list = [
            Desc::new(0xf0, 0x20, "wide", 1, 1, 1),
            Desc::new(0xff, 0x20, "narrow", 2, 1, 1),
        ];
        let dec = DecoderBuilder::new(byte_key(), &list, UND).build().unwrap();
        assert_eq!(dec.lookup(0x20).name, "narrow");
        assert_eq!(dec.lookup(0x21).name, "wide");
    }

    #[test]
    fn icode_outside_mask_is_invalid() {
        let list = [Desc::new(0xf0, 0x0f, "bad", 1, 1, 1)];
        assert!(matches!(
            DecoderBuilder::new(byte_key(), &list, UND).build(),
            Err(DecoderError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn mask_exceeding_declared_length_is_invalid() {
        let key = KeySpec::top_bits(8, 2, 8);
        let list = [Desc::new(0xff0f, 0x1004, "bad", 1, 1, 1)];
        assert!(matches!(
            DecoderBuilder::new(key, &list, UND).build(),
            Err(DecoderError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn variable_length_left_alignment() {
        // 1-byte and 2-byte instructions in a 2-byte word space.
        let key = KeySpec::top_bits(8, 2, 8);
        let list = [
            Desc::new(0xff, 0xa0, "short", 1, 1, 1),
            Desc::new(0xffff, 0xb1cd, "long", 2, 2, 2),
        ];
        let dec = DecoderBuilder::new(key, &list, UND).build().unwrap();
        assert_eq!(dec.lookup(0xa055).name, "short");
        assert_eq!(dec.lookup(0xb1cd).name, "long");
        assert_eq!(dec.lookup(0xb1ce).name, "und");
    }

    #[test]
    fn sub_table_installed_for_second_unit_discrimination() {
        let key = KeySpec::top_bits(8, 2, 8);
        let list = [
            Desc::new(0xffff, 0x10aa, "two_a", 1, 2, 2),
            Desc::new(0xffff, 0x10bb, "two_b", 2, 2, 2),
            Desc::new(0xff, 0x20, "one", 3, 1, 1),
        ];
        let dec = DecoderBuilder::new(key, &list, UND).build().unwrap();
        assert_eq!(dec.nr_sub_tables(), 1);
        assert_eq!(dec.lookup(0x10aa).name, "two_a");
        assert_eq!(dec.lookup(0x10bb).name, "two_b");
        assert_eq!(dec.lookup(0x10cc).name, "und");
        assert_eq!(dec.lookup(0x20ff).name, "one");
    }

    #[test]
    fn mixed_lengths_under_one_key_use_sub_table() {
        // A 1-byte catch-all plus a 2-byte specialization of the same
        // leading byte: the second byte decides.
        let key = KeySpec::top_bits(8, 2, 8);
        let list = [
            Desc::new(0xff, 0x30, "short", 1, 1, 1),
            Desc::new(0xffff, 0x3077, "long", 2, 2, 2),
        ];
        let dec = DecoderBuilder::new(key, &list, UND).build().unwrap();
        assert_eq!(dec.lookup(0x3077).name, "long");
        assert_eq!(dec.lookup(0x3078).name, "short");
    }

    #[test]
    fn exists_predicate_vetoes_encodings() {
        fn no_odd(_: &Desc, opcode: u32) -> Option<u8> {
            // Encodings with an odd low nibble of the second byte do not
            // exist; everything else costs one memory access.
            if opcode & 0x01 != 0 { None } else { Some(1) }
        }
        let key = KeySpec::top_bits(8, 2, 8);
        let mut desc = Desc::new(0xff00, 0x4000, "gated", 1, 2, 1);
        desc.exists = Some(no_odd);
        let dec = DecoderBuilder::new(key, &[desc], UND)
            .access_cycles(|n| n as u32 * 2)
            .build()
            .unwrap();
        assert_eq!(dec.lookup(0x4002).name, "gated");
        assert_eq!(dec.lookup(0x4002).cycles, 3);
        assert_eq!(dec.lookup(0x4002).mem_accesses, 1);
        assert_eq!(dec.lookup(0x4003).name, "und");
    }

    #[test]
    fn cycle_multiplier_scales_counts() {
        let list = [Desc::new(0xff, 0x00, "nop", 1, 1, 2)];
        let dec = DecoderBuilder::new(byte_key(), &list, UND)
            .cycle_multiplier(12)
            .build()
            .unwrap();
        assert_eq!(dec.lookup(0x00).cycles, 24);
        assert_eq!(dec.lookup(0x55).cycles, 12);
    }

    #[test]
    fn scattered_key_dispatch() {
        // 16-bit ISA keyed by the top nibble and bottom nibble.
        fn extract(op: u32) -> u32 {
            ((op >> 8) & 0xf0) | (op & 0x0f)
        }
        fn expand(key: u32) -> u32 {
            ((key & 0xf0) << 8) | (key & 0x0f)
        }
        let key = KeySpec::scattered(16, 8, extract, expand, 0xf00f);
        let list = [
            Desc::new(0xf00f, 0x5001, "alpha", 1, 1, 1),
            Desc::new(0xf00f, 0x6002, "beta", 2, 1, 1),
        ];
        let dec = DecoderBuilder::new(key, &list, UND).build().unwrap();
        assert_eq!(dec.lookup(0x5ab1).name, "alpha");
        assert_eq!(dec.lookup(0x6cd2).name, "beta");
        assert_eq!(dec.lookup(0x5ab2).name, "und");
    }

    #[test]
    fn scattered_key_rejects_uncovered_mask() {
        fn extract(op: u32) -> u32 {
            op >> 8
        }
        fn expand(key: u32) -> u32 {
            key << 8
        }
        let key = KeySpec::scattered(16, 8, extract, expand, 0xff00);
        let list = [Desc::new(0xff01, 0x1200, "bad", 1, 1, 1)];
        assert!(matches!(
            DecoderBuilder::new(key, &list, UND).build(),
            Err(DecoderError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn table_matches_linear_reference_exhaustively() {
        let key = KeySpec::top_bits(8, 2, 8);
        let list = [
            Desc::new(0xf8, 0x28, "fam", 1, 1, 1),
            Desc::new(0xff, 0x2d, "exact", 2, 2, 1),
            Desc::new(0xfe, 0x2e, "pair", 3, 1, 1),
            Desc::new(0xffff, 0x28aa, "deep", 4, 2, 2),
            Desc::new(0xff80, 0x9000, "wide2", 5, 2, 2),
        ];
        let dec = DecoderBuilder::new(key, &list, UND).build().unwrap();
        for op in 0..=0xffffu32 {
            assert_eq!(*dec.lookup(op), dec.lookup_linear(op), "opcode {op:#x}");
        }
    }
}
