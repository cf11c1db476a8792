//! Minimal `.mpy` image builder
//!
//! Produces bytecode-only version 6 images with hand-written line tables, so
//! the decoder can be exercised without an `mpy-cross` binary.

use super::reader::MPY_VERSION;

/// Encode a big-endian base-128 varuint
#[must_use]
pub fn encode_varuint(mut value: u32) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value != 0 {
        out.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

/// Encode `(bytecode_delta, line_delta)` steps the way the compiler does,
/// splitting large deltas over several entries
#[must_use]
pub fn encode_line_table(steps: &[(u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(mut bytes, mut lines) in steps {
        if bytes == 0 && lines == 0 {
            continue;
        }
        while bytes > 0 || lines > 0 {
            if lines <= 3 {
                // Lines advance only once all pending bytecode is covered
                let b = bytes.min(0x1f);
                let l = if b < bytes { 0 } else { lines };
                out.push((b | (l << 5)) as u8);
                bytes -= b;
                lines -= l;
            } else {
                let b = bytes.min(0xf);
                let l = lines.min(0x7ff);
                out.push((0x80 | b | ((l >> 4) & 0x70)) as u8);
                out.push((l & 0xff) as u8);
                bytes -= b;
                lines -= l;
            }
        }
    }
    out
}

/// Encode a line table that visits `lines` in order, one instruction each
#[must_use]
pub fn line_table_for(lines: &[u32]) -> Vec<u8> {
    let mut current = 1;
    let mut steps = Vec::new();
    for &line in lines {
        steps.push((2, line.saturating_sub(current)));
        current = current.max(line);
    }
    encode_line_table(&steps)
}

/// One bytecode function
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    simple_name: u32,
    n_state: u32,
    n_pos_args: u32,
    n_kwonly_args: u32,
    n_cell: u32,
    line_info: Vec<u8>,
    opcodes: Vec<u8>,
    children: Vec<FunctionBuilder>,
}

impl FunctionBuilder {
    /// Function whose simple name is qstr `simple_name`
    #[must_use]
    pub fn new(simple_name: u32) -> Self {
        Self {
            simple_name,
            n_state: 1,
            n_pos_args: 0,
            n_kwonly_args: 0,
            n_cell: 0,
            line_info: Vec::new(),
            // LOAD_CONST_NONE, RETURN_VALUE
            opcodes: vec![0x51, 0x63],
            children: Vec::new(),
        }
    }

    /// Set the state size
    #[must_use]
    pub fn n_state(mut self, n: u32) -> Self {
        self.n_state = n.max(1);
        self
    }

    /// Set the positional argument count
    #[must_use]
    pub fn n_pos_args(mut self, n: u32) -> Self {
        self.n_pos_args = n;
        self
    }

    /// Set the keyword-only argument count
    #[must_use]
    pub fn n_kwonly_args(mut self, n: u32) -> Self {
        self.n_kwonly_args = n;
        self
    }

    /// Set the number of closure cells
    #[must_use]
    pub fn n_cell(mut self, n: u32) -> Self {
        self.n_cell = n;
        self
    }

    /// Set the encoded line table
    #[must_use]
    pub fn line_info(mut self, bytes: &[u8]) -> Self {
        self.line_info = bytes.to_vec();
        self
    }

    /// Set the line table from a sequence of visited lines
    #[must_use]
    pub fn lines(self, lines: &[u32]) -> Self {
        let table = line_table_for(lines);
        self.line_info(&table)
    }

    /// Add a nested function
    #[must_use]
    pub fn child(mut self, child: FunctionBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Prelude, source info, closure info and opcodes
    #[must_use]
    pub fn build_fun_data(&self) -> Vec<u8> {
        let mut out = Vec::new();

        // Signature: xSSSSEAA then xFSSKAED
        let mut s = self.n_state - 1;
        let mut a = self.n_pos_args;
        let mut k = self.n_kwonly_args;
        let mut z = ((s & 0xf) << 3) | (a & 0x3);
        s >>= 4;
        a >>= 2;
        while s != 0 || a != 0 || k != 0 {
            out.push((z | 0x80) as u8);
            z = ((s & 0x3) << 4) | ((k & 0x1) << 3) | ((a & 0x1) << 2);
            s >>= 2;
            a >>= 1;
            k >>= 1;
        }
        out.push(z as u8);

        let mut info = encode_varuint(self.simple_name);
        for _ in 0..self.n_pos_args + self.n_kwonly_args {
            info.extend(encode_varuint(0));
        }
        info.extend(&self.line_info);

        // Size: xIIIIIIC
        let mut i = info.len() as u32;
        let mut c = self.n_cell;
        loop {
            let mut z = ((i & 0x3f) << 1) | (c & 0x1);
            i >>= 6;
            c >>= 1;
            if i != 0 || c != 0 {
                z |= 0x80;
            }
            out.push(z as u8);
            if i == 0 && c == 0 {
                break;
            }
        }

        out.extend(info);
        out.extend((0..self.n_cell).map(|cell| cell as u8));
        out.extend(&self.opcodes);
        out
    }

    /// Raw-code record: `kind_len`, function data, children
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let fun_data = self.build_fun_data();
        let has_children = u32::from(!self.children.is_empty());
        // Bytecode kind is encoded as 0
        let kind_len = ((fun_data.len() as u32) << 3) | (has_children << 2);
        let mut out = encode_varuint(kind_len);
        out.extend(fun_data);
        if !self.children.is_empty() {
            out.extend(encode_varuint(self.children.len() as u32));
            for child in &self.children {
                out.extend(child.encode());
            }
        }
        out
    }
}

/// A whole `.mpy` image
#[derive(Debug, Clone, Default)]
pub struct MpyBuilder {
    qstrs: Vec<Vec<u8>>,
    constants: Vec<Vec<u8>>,
}

impl MpyBuilder {
    /// Empty tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an inline qstr
    #[must_use]
    pub fn qstr(mut self, s: &str) -> Self {
        let mut entry = encode_varuint((s.len() as u32) << 1);
        entry.extend(s.as_bytes());
        entry.push(0);
        self.qstrs.push(entry);
        self
    }

    /// Append a reference to a static qstr
    #[must_use]
    pub fn static_qstr(mut self, index: u32) -> Self {
        self.qstrs.push(encode_varuint((index << 1) | 1));
        self
    }

    /// Append a `str` constant
    #[must_use]
    pub fn constant_str(mut self, s: &str) -> Self {
        let mut entry = vec![5];
        entry.extend(encode_varuint(s.len() as u32));
        entry.extend(s.as_bytes());
        entry.push(0);
        self.constants.push(entry);
        self
    }

    /// Serialize with `module` as the top-level raw code
    #[must_use]
    pub fn build(&self, module: &FunctionBuilder) -> Vec<u8> {
        let mut out = vec![b'M', MPY_VERSION, 0, 31];
        out.extend(encode_varuint(self.qstrs.len() as u32));
        out.extend(encode_varuint(self.constants.len() as u32));
        for q in &self.qstrs {
            out.extend(q);
        }
        for c in &self.constants {
            out.extend(c);
        }
        out.extend(module.encode());
        out
    }
}
