//! Reader for MicroPython `.mpy` (version 6) containers
//!
//! Layout:
//!
//! ```text
//! header      'M' version feature small_int_bits
//! n_qstr      varuint
//! n_obj       varuint
//! qstrs       n_qstr * qstr
//! objects     n_obj * object
//! raw code    kind_len varuint, fun_data, [n_children varuint, children...]
//! ```
//!
//! Only bytecode raw codes are understood. Native, viper and inline-asm code
//! carries relocation data this reader does not parse.

use std::ops::Range;
use thiserror::Error;

/// Supported container version
pub const MPY_VERSION: u8 = 6;

/// Bytecode raw-code kind (`MP_CODE_BYTECODE`)
const KIND_BYTECODE: u32 = 2;

/// Nesting bound for tuples and raw-code children
const MAX_DEPTH: usize = 128;

/// Structural errors in a `.mpy` byte stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended inside a field
    #[error("unexpected end of data at offset {offset}")]
    Truncated {
        /// Offset of the failed read
        offset: usize,
    },

    /// Not an `.mpy` file
    #[error("bad magic byte {0:#04x}")]
    BadMagic(u8),

    /// Container version other than 6
    #[error("unsupported .mpy version {0} (expected {MPY_VERSION})")]
    UnsupportedVersion(u8),

    /// A varuint does not fit in 32 bits
    #[error("varuint overflow at offset {offset}")]
    Overflow {
        /// Offset where the varuint started
        offset: usize,
    },

    /// Unknown constant type tag
    #[error("unknown object type {0}")]
    UnknownObject(u8),

    /// Raw code that is not bytecode
    #[error("native code (kind {0}) is not supported")]
    NativeCode(u32),

    /// Inline string is not UTF-8
    #[error("invalid UTF-8 in string at offset {offset}")]
    Utf8 {
        /// Offset of the string
        offset: usize,
    },

    /// Prelude fields point outside the function data
    #[error("inconsistent bytecode prelude: {0}")]
    Prelude(&'static str),

    /// Nesting deeper than the reader accepts
    #[error("nesting too deep")]
    TooDeep,
}

/// Result alias for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Cursor over a byte slice with MicroPython's varuint encoding
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at offset 0
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Read a big-endian base-128 varuint (`0x80` = more bytes follow)
    pub fn read_varuint(&mut self) -> DecodeResult<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if value > (u32::MAX >> 7) {
                return Err(DecodeError::Overflow { offset: start });
            }
            value = (value << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn read_str(&mut self, len: usize) -> DecodeResult<String> {
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Utf8 { offset })
    }
}

/// Container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version
    pub version: u8,
    /// Format sub-version (low two bits of the feature byte)
    pub sub_version: u8,
    /// Native architecture the file was built for, 0 for none
    pub native_arch: u8,
    /// Bits in a small int on the compiling target
    pub small_int_bits: u8,
}

/// Entry of the qstr table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qstr {
    /// Index into the runtime's static qstr table
    Static(u32),
    /// String carried in the file
    Inline(String),
}

/// Entry of the constant object table
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Marker for the native function table
    FunTable,
    /// `None`
    None,
    /// `False`
    False,
    /// `True`
    True,
    /// `...`
    Ellipsis,
    /// `str` literal
    Str(String),
    /// `bytes` literal
    Bytes(Vec<u8>),
    /// Big integer, as its decimal text
    Int(String),
    /// Float, as its text
    Float(String),
    /// Complex, as its text
    Complex(String),
    /// Tuple of constants
    Tuple(Vec<Constant>),
}

/// Decoded bytecode prelude of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prelude {
    /// Value stack plus locals
    pub n_state: u32,
    /// Exception stack depth
    pub n_exc_stack: u32,
    /// Scope flags
    pub scope_flags: u32,
    /// Positional arguments
    pub n_pos_args: u32,
    /// Keyword-only arguments
    pub n_kwonly_args: u32,
    /// Positional arguments with defaults
    pub n_def_pos_args: u32,
    /// Bytes of source info (names and line table)
    pub n_info: u32,
    /// Bytes of closure info
    pub n_cell: u32,
    /// Qstr index of the function's simple name
    pub simple_name: u32,
    /// Qstr indices of the argument names
    pub arg_names: Vec<u32>,
    /// Byte range of the line table inside the function data
    pub line_info: Range<usize>,
    /// Offset of the first opcode
    pub opcodes: usize,
}

impl Prelude {
    /// Decode the prelude at the start of `fun_data`
    pub fn parse(fun_data: &[u8]) -> DecodeResult<Self> {
        let mut r = ByteReader::new(fun_data);

        // Signature: xSSSSEAA, then xFSSKAED while the top bit is set
        let mut z = u32::from(r.read_u8()?);
        let mut n_state = (z >> 3) & 0xf;
        let mut n_exc_stack = (z >> 2) & 0x1;
        let mut scope_flags = 0;
        let mut n_pos_args = z & 0x3;
        let mut n_kwonly_args = 0;
        let mut n_def_pos_args = 0;
        let mut n = 0;
        while z & 0x80 != 0 {
            if n > 4 {
                return Err(DecodeError::Prelude("signature too long"));
            }
            z = u32::from(r.read_u8()?);
            n_state |= (z & 0x30) << (2 * n);
            n_exc_stack |= (z & 0x02) << n;
            scope_flags |= ((z & 0x40) >> 6) << n;
            n_pos_args |= (z & 0x4) << n;
            n_kwonly_args |= ((z & 0x08) >> 3) << n;
            n_def_pos_args |= (z & 0x1) << n;
            n += 1;
        }
        n_state += 1;

        // Size: xIIIIIIC repeated while the top bit is set
        let mut n_info = 0;
        let mut n_cell = 0;
        let mut n = 0;
        loop {
            if n > 4 {
                return Err(DecodeError::Prelude("size too long"));
            }
            let z = u32::from(r.read_u8()?);
            n_info |= ((z & 0x7e) >> 1) << (6 * n);
            n_cell |= (z & 1) << n;
            if z & 0x80 == 0 {
                break;
            }
            n += 1;
        }

        let info_start = r.position();
        let simple_name = r.read_varuint()?;
        let n_args = n_pos_args + n_kwonly_args;
        let mut arg_names = Vec::new();
        for _ in 0..n_args {
            arg_names.push(r.read_varuint()?);
        }
        let line_start = r.position();

        let closure_start = info_start
            .checked_add(n_info as usize)
            .ok_or(DecodeError::Prelude("source info overflows"))?;
        let opcodes = closure_start
            .checked_add(n_cell as usize)
            .ok_or(DecodeError::Prelude("closure info overflows"))?;
        if line_start > closure_start {
            return Err(DecodeError::Prelude("argument names exceed source info"));
        }
        if opcodes > fun_data.len() {
            return Err(DecodeError::Prelude("source info exceeds function data"));
        }

        Ok(Self {
            n_state,
            n_exc_stack,
            scope_flags,
            n_pos_args,
            n_kwonly_args,
            n_def_pos_args,
            n_info,
            n_cell,
            simple_name,
            arg_names,
            line_info: line_start..closure_start,
            opcodes,
        })
    }
}

/// A compiled bytecode function and its nested functions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCode {
    /// Prelude followed by opcodes
    pub fun_data: Vec<u8>,
    /// Decoded prelude
    pub prelude: Prelude,
    /// Nested functions, classes and closures
    pub children: Vec<RawCode>,
}

impl RawCode {
    /// The encoded line table of this function only
    #[must_use]
    pub fn line_info(&self) -> &[u8] {
        self.fun_data
            .get(self.prelude.line_info.clone())
            .unwrap_or_default()
    }

    /// This function and all nested ones, depth first
    pub fn walk(&self) -> impl Iterator<Item = &RawCode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

/// A parsed `.mpy` file
#[derive(Debug, Clone, PartialEq)]
pub struct MpyFile {
    /// Header
    pub header: Header,
    /// Qstr table
    pub qstrs: Vec<Qstr>,
    /// Constant table
    pub constants: Vec<Constant>,
    /// Module-level raw code
    pub raw_code: RawCode,
}

impl MpyFile {
    /// Parse a whole `.mpy` image
    pub fn parse(data: &[u8]) -> DecodeResult<Self> {
        let mut r = ByteReader::new(data);

        let magic = r.read_u8()?;
        if magic != b'M' {
            return Err(DecodeError::BadMagic(magic));
        }
        let version = r.read_u8()?;
        if version != MPY_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let feature = r.read_u8()?;
        let small_int_bits = r.read_u8()?;
        let header = Header {
            version,
            sub_version: feature & 0x3,
            native_arch: feature >> 2,
            small_int_bits,
        };

        let n_qstr = r.read_varuint()?;
        let n_obj = r.read_varuint()?;

        let mut qstrs = Vec::new();
        for _ in 0..n_qstr {
            qstrs.push(read_qstr(&mut r)?);
        }
        let mut constants = Vec::new();
        for _ in 0..n_obj {
            constants.push(read_constant(&mut r, 0)?);
        }
        let raw_code = read_raw_code(&mut r, 0)?;

        Ok(Self {
            header,
            qstrs,
            constants,
            raw_code,
        })
    }

    /// Resolve an inline qstr by table index
    #[must_use]
    pub fn qstr(&self, index: u32) -> Option<&str> {
        match self.qstrs.get(index as usize)? {
            Qstr::Inline(s) => Some(s),
            Qstr::Static(_) => None,
        }
    }
}

fn read_qstr(r: &mut ByteReader<'_>) -> DecodeResult<Qstr> {
    let len = r.read_varuint()?;
    if len & 1 != 0 {
        return Ok(Qstr::Static(len >> 1));
    }
    let s = r.read_str((len >> 1) as usize)?;
    let _nul = r.read_u8()?;
    Ok(Qstr::Inline(s))
}

fn read_constant(r: &mut ByteReader<'_>, depth: usize) -> DecodeResult<Constant> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep);
    }
    let tag = r.read_u8()?;
    let constant = match tag {
        0 => Constant::FunTable,
        1 => Constant::None,
        2 => Constant::False,
        3 => Constant::True,
        4 => Constant::Ellipsis,
        10 => {
            let len = r.read_varuint()?;
            let mut items = Vec::new();
            for _ in 0..len {
                items.push(read_constant(r, depth + 1)?);
            }
            Constant::Tuple(items)
        }
        5..=9 => {
            let len = r.read_varuint()? as usize;
            match tag {
                5 => {
                    let s = r.read_str(len)?;
                    let _nul = r.read_u8()?;
                    Constant::Str(s)
                }
                6 => {
                    let b = r.read_bytes(len)?.to_vec();
                    let _nul = r.read_u8()?;
                    Constant::Bytes(b)
                }
                7 => Constant::Int(r.read_str(len)?),
                8 => Constant::Float(r.read_str(len)?),
                _ => Constant::Complex(r.read_str(len)?),
            }
        }
        other => return Err(DecodeError::UnknownObject(other)),
    };
    Ok(constant)
}

fn read_raw_code(r: &mut ByteReader<'_>, depth: usize) -> DecodeResult<RawCode> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep);
    }
    let kind_len = r.read_varuint()?;
    let kind = (kind_len & 3) + KIND_BYTECODE;
    if kind != KIND_BYTECODE {
        return Err(DecodeError::NativeCode(kind));
    }
    let has_children = (kind_len >> 2) & 1 != 0;
    let fun_data = r.read_bytes((kind_len >> 3) as usize)?.to_vec();
    let prelude = Prelude::parse(&fun_data)?;

    let mut children = Vec::new();
    if has_children {
        let n_children = r.read_varuint()?;
        for _ in 0..n_children {
            children.push(read_raw_code(r, depth + 1)?);
        }
    }

    Ok(RawCode {
        fun_data,
        prelude,
        children,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mpy::builder::{encode_varuint, FunctionBuilder, MpyBuilder};

    mod varuint_tests {
        use super::*;

        #[test]
        fn test_single_byte() {
            let mut r = ByteReader::new(&[0x05]);
            assert_eq!(r.read_varuint().unwrap(), 5);
            assert_eq!(r.remaining(), 0);
        }

        #[test]
        fn test_big_endian_groups() {
            // 300 = 0b10_0101100 -> 0x82 0x2c
            let mut r = ByteReader::new(&[0x82, 0x2c]);
            assert_eq!(r.read_varuint().unwrap(), 300);
        }

        #[test]
        fn test_encoder_agrees() {
            for value in [0, 1, 127, 128, 300, 16_383, 16_384, u32::MAX] {
                let bytes = encode_varuint(value);
                assert_eq!(ByteReader::new(&bytes).read_varuint().unwrap(), value);
            }
        }

        #[test]
        fn test_truncated() {
            let mut r = ByteReader::new(&[0x80]);
            assert_eq!(r.read_varuint(), Err(DecodeError::Truncated { offset: 1 }));
        }

        #[test]
        fn test_overflow() {
            let mut r = ByteReader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
            assert!(matches!(r.read_varuint(), Err(DecodeError::Overflow { .. })));
        }
    }

    mod prelude_tests {
        use super::*;

        #[test]
        fn test_simple_signature() {
            let f = FunctionBuilder::new(0).n_state(3).n_pos_args(2).build_fun_data();
            let p = Prelude::parse(&f).unwrap();
            assert_eq!(p.n_state, 3);
            assert_eq!(p.n_pos_args, 2);
            assert_eq!(p.arg_names.len(), 2);
        }

        #[test]
        fn test_extended_signature() {
            // n_state 40 and 5 positional args need an extension byte
            let f = FunctionBuilder::new(0).n_state(40).n_pos_args(5).build_fun_data();
            let p = Prelude::parse(&f).unwrap();
            assert_eq!(p.n_state, 40);
            assert_eq!(p.n_pos_args, 5);
        }

        #[test]
        fn test_line_info_range_stops_before_closure_info() {
            let f = FunctionBuilder::new(0)
                .line_info(&[0x21, 0x22])
                .n_cell(1)
                .build_fun_data();
            let p = Prelude::parse(&f).unwrap();
            assert_eq!(&f[p.line_info.clone()], &[0x21, 0x22]);
            assert_eq!(p.opcodes, p.line_info.end + 1);
        }

        #[test]
        fn test_info_past_end_rejected() {
            // signature 0x00, size n_info=10, then only a name byte
            let f = [0x00, 10 << 1, 0x00];
            assert!(matches!(Prelude::parse(&f), Err(DecodeError::Prelude(_))));
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_parse_module_with_child() {
            let child = FunctionBuilder::new(1).line_info(&[0x41]);
            let module = FunctionBuilder::new(0).line_info(&[0x21]).child(child);
            let bytes = MpyBuilder::new()
                .qstr("<module>")
                .qstr("helper")
                .constant_str("hi")
                .build(&module);

            let file = MpyFile::parse(&bytes).unwrap();
            assert_eq!(file.header.version, MPY_VERSION);
            assert_eq!(file.qstr(0), Some("<module>"));
            assert_eq!(file.constants, vec![Constant::Str("hi".to_string())]);
            assert_eq!(file.raw_code.children.len(), 1);
            assert_eq!(file.raw_code.children[0].line_info(), &[0x41]);
            assert_eq!(file.raw_code.walk().count(), 2);
        }

        #[test]
        fn test_static_qstr() {
            let bytes = MpyBuilder::new()
                .static_qstr(12)
                .build(&FunctionBuilder::new(0));
            let file = MpyFile::parse(&bytes).unwrap();
            assert_eq!(file.qstrs, vec![Qstr::Static(12)]);
            assert_eq!(file.qstr(0), None);
        }

        #[test]
        fn test_bad_magic() {
            assert_eq!(MpyFile::parse(b"C\x06\x00\x1f"), Err(DecodeError::BadMagic(b'C')));
        }

        #[test]
        fn test_wrong_version() {
            assert_eq!(
                MpyFile::parse(b"M\x05\x00\x1f"),
                Err(DecodeError::UnsupportedVersion(5))
            );
        }

        #[test]
        fn test_native_code_rejected() {
            let mut bytes = b"M\x06\x00\x1f".to_vec();
            bytes.extend([0, 0]); // no qstrs, no objects
            bytes.push(0x01); // kind_len: native python, no children, empty
            assert_eq!(MpyFile::parse(&bytes), Err(DecodeError::NativeCode(3)));
        }

        #[test]
        fn test_every_truncation_is_an_error() {
            let module = FunctionBuilder::new(0)
                .line_info(&[0x21, 0x81, 0x05])
                .child(FunctionBuilder::new(1).line_info(&[0x41]));
            let bytes = MpyBuilder::new().qstr("<module>").build(&module);
            for len in 0..bytes.len() {
                assert!(MpyFile::parse(&bytes[..len]).is_err(), "prefix {len}");
            }
            assert!(MpyFile::parse(&bytes).is_ok());
        }

        #[test]
        fn test_nested_tuple_constant() {
            let mut bytes = b"M\x06\x00\x1f".to_vec();
            bytes.extend([0, 1]);
            // (None, True, 7)
            bytes.extend([10, 3, 1, 3, 7, 1, b'7']);
            bytes.extend(FunctionBuilder::new(0).encode());
            let file = MpyFile::parse(&bytes).unwrap();
            assert_eq!(
                file.constants,
                vec![Constant::Tuple(vec![
                    Constant::None,
                    Constant::True,
                    Constant::Int("7".to_string())
                ])]
            );
        }
    }
}
