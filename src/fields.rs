// Rather than have magic numbers everywhere, we opt for rich types wherever
// it is not too ridiculous: sized bus values here, plus the sub-opcode fields
// of the VCP instruction set. The instruction decoder is the naturally messy
// code responsible for constructing said rich types.

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Size {
    Byte = 1,
    Word = 2,
    Long = 4,
}

impl Size {
    pub fn from(&self, res: u32) -> OpResult {
        match *self {
            Self::Byte => OpResult::Byte(res as u8),
            Self::Word => OpResult::Word(res as u16),
            Self::Long => OpResult::Long(res),
        }
    }
    pub fn from_le_bytes(&self, slice: &[u8]) -> OpResult {
        match *self {
            Self::Byte => OpResult::Byte(slice[0]),
            Self::Word => OpResult::Word(u16::from_le_bytes([slice[0], slice[1]])),
            Self::Long => {
                OpResult::Long(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
            }
        }
    }
    pub fn zero(&self) -> OpResult {
        self.from(0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum OpResult {
    Byte(u8),
    Word(u16),
    Long(u32),
}

impl OpResult {
    pub fn inner(&self) -> u32 {
        match *self {
            Self::Byte(b) => b as u32,
            Self::Word(w) => w as u32,
            Self::Long(l) => l,
        }
    }
    pub fn size(&self) -> Size {
        match *self {
            Self::Byte(_) => Size::Byte,
            Self::Word(_) => Size::Word,
            Self::Long(_) => Size::Long,
        }
    }
}

/// MATHOP function field, carried in imm8.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MathFunc {
    Add = 0x0,
    Sub = 0x1,
    Inc = 0x2,
    Dec = 0x3,
}

impl MathFunc {
    pub fn from_imm8(imm8: u32) -> Option<Self> {
        match imm8 {
            0x0 => Some(Self::Add),
            0x1 => Some(Self::Sub),
            0x2 => Some(Self::Inc),
            0x3 => Some(Self::Dec),
            _ => None,
        }
    }
    pub fn apply(&self, v1: u32, v2: u32) -> u32 {
        match *self {
            Self::Add => v1.wrapping_add(v2),
            Self::Sub => v1.wrapping_sub(v2),
            Self::Inc => v1.wrapping_add(1),
            Self::Dec => v1.wrapping_sub(1),
        }
    }
}

/// LOGICOP function field, carried in imm8. Shift counts are masked to 5 bits.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LogicFunc {
    And = 0x0,
    Or = 0x1,
    Xor = 0x2,
    Asr = 0x3,
    Lsr = 0x4,
    Shl = 0x5,
    Not = 0x6,
    ReadCmp = 0x7,
    ReadCtl = 0x8,
}

impl LogicFunc {
    pub fn from_imm8(imm8: u32) -> Option<Self> {
        match imm8 {
            0x0 => Some(Self::And),
            0x1 => Some(Self::Or),
            0x2 => Some(Self::Xor),
            0x3 => Some(Self::Asr),
            0x4 => Some(Self::Lsr),
            0x5 => Some(Self::Shl),
            0x6 => Some(Self::Not),
            0x7 => Some(Self::ReadCmp),
            0x8 => Some(Self::ReadCtl),
            _ => None,
        }
    }
    pub fn apply(&self, v1: u32, v2: u32, cmpreg: u32) -> u32 {
        match *self {
            Self::And => v1 & v2,
            Self::Or => v1 | v2,
            Self::Xor => v1 ^ v2,
            Self::Asr => ((v1 as i32) >> (v2 & 0x1f)) as u32,
            Self::Lsr => v1 >> (v2 & 0x1f),
            Self::Shl => v1 << (v2 & 0x1f),
            Self::Not => !v1,
            Self::ReadCmp => cmpreg,
            // Control register readback is not wired up on this core.
            Self::ReadCtl => 0,
        }
    }
}

/// CMP condition field, carried in imm8. The upper bit negates, hence the
/// non-contiguous encodings (GT = LE | 0x8 and so on).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Condition {
    Le = 0x1,
    Lt = 0x2,
    Eq = 0x4,
    Gt = 0x9,
    Ge = 0xa,
    Ne = 0xc,
}

impl Condition {
    pub fn from_imm8(imm8: u32) -> Option<Self> {
        match imm8 {
            0x1 => Some(Self::Le),
            0x2 => Some(Self::Lt),
            0x4 => Some(Self::Eq),
            0x9 => Some(Self::Gt),
            0xa => Some(Self::Ge),
            0xc => Some(Self::Ne),
            _ => None,
        }
    }
    pub fn eval(&self, v1: u32, v2: u32) -> bool {
        match *self {
            Self::Le => v1 <= v2,
            Self::Lt => v1 < v2,
            Self::Eq => v1 == v2,
            Self::Gt => v1 > v2,
            Self::Ge => v1 >= v2,
            Self::Ne => v1 != v2,
        }
    }
}
