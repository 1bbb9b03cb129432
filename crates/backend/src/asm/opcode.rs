use std::fmt;

macro_rules! opcodes {
    ($($name:ident = $byte:literal => $mnemonic:literal),* $(,)?) => {
        /// An EVM instruction.
        ///
        /// Bytes without a defined instruction are preserved as [`Opcode::Unknown`], and
        /// [`Opcode::Data`] marks raw byte blobs spliced into a stream.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $($name,)*
            Unknown(u8),
            Data,
        }

        impl Opcode {
            /// Returns the encoded byte, or `None` for [`Opcode::Data`].
            pub const fn byte(self) -> Option<u8> {
                match self {
                    $(Self::$name => Some($byte),)*
                    Self::Unknown(byte) => Some(byte),
                    Self::Data => None,
                }
            }

            /// Decodes a byte. Total: undefined bytes map to [`Opcode::Unknown`].
            pub const fn from_byte(byte: u8) -> Self {
                match byte {
                    $($byte => Self::$name,)*
                    _ => Self::Unknown(byte),
                }
            }

            /// Looks up an upper-case mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Self::$name),)*
                    "SHA3" => Some(Self::Keccak256),
                    "DIFFICULTY" => Some(Self::Prevrandao),
                    "DATA" => Some(Self::Data),
                    _ => None,
                }
            }

            /// Returns the mnemonic, if the opcode has one.
            pub const fn mnemonic(self) -> Option<&'static str> {
                match self {
                    $(Self::$name => Some($mnemonic),)*
                    Self::Unknown(_) => None,
                    Self::Data => Some("DATA"),
                }
            }
        }
    };
}

opcodes! {
    Stop = 0x00 => "STOP",
    Add = 0x01 => "ADD",
    Mul = 0x02 => "MUL",
    Sub = 0x03 => "SUB",
    Div = 0x04 => "DIV",
    Sdiv = 0x05 => "SDIV",
    Mod = 0x06 => "MOD",
    Smod = 0x07 => "SMOD",
    Addmod = 0x08 => "ADDMOD",
    Mulmod = 0x09 => "MULMOD",
    Exp = 0x0a => "EXP",
    Signextend = 0x0b => "SIGNEXTEND",
    Lt = 0x10 => "LT",
    Gt = 0x11 => "GT",
    Slt = 0x12 => "SLT",
    Sgt = 0x13 => "SGT",
    Eq = 0x14 => "EQ",
    IsZero = 0x15 => "ISZERO",
    And = 0x16 => "AND",
    Or = 0x17 => "OR",
    Xor = 0x18 => "XOR",
    Not = 0x19 => "NOT",
    Byte = 0x1a => "BYTE",
    Shl = 0x1b => "SHL",
    Shr = 0x1c => "SHR",
    Sar = 0x1d => "SAR",
    Keccak256 = 0x20 => "KECCAK256",
    Address = 0x30 => "ADDRESS",
    Balance = 0x31 => "BALANCE",
    Origin = 0x32 => "ORIGIN",
    Caller = 0x33 => "CALLER",
    CallValue = 0x34 => "CALLVALUE",
    CallDataLoad = 0x35 => "CALLDATALOAD",
    CallDataSize = 0x36 => "CALLDATASIZE",
    CallDataCopy = 0x37 => "CALLDATACOPY",
    CodeSize = 0x38 => "CODESIZE",
    CodeCopy = 0x39 => "CODECOPY",
    GasPrice = 0x3a => "GASPRICE",
    ExtCodeSize = 0x3b => "EXTCODESIZE",
    ExtCodeCopy = 0x3c => "EXTCODECOPY",
    ReturnDataSize = 0x3d => "RETURNDATASIZE",
    ReturnDataCopy = 0x3e => "RETURNDATACOPY",
    ExtCodeHash = 0x3f => "EXTCODEHASH",
    BlockHash = 0x40 => "BLOCKHASH",
    Coinbase = 0x41 => "COINBASE",
    Timestamp = 0x42 => "TIMESTAMP",
    Number = 0x43 => "NUMBER",
    Prevrandao = 0x44 => "PREVRANDAO",
    GasLimit = 0x45 => "GASLIMIT",
    ChainId = 0x46 => "CHAINID",
    SelfBalance = 0x47 => "SELFBALANCE",
    BaseFee = 0x48 => "BASEFEE",
    BlobHash = 0x49 => "BLOBHASH",
    BlobBaseFee = 0x4a => "BLOBBASEFEE",
    Pop = 0x50 => "POP",
    Mload = 0x51 => "MLOAD",
    Mstore = 0x52 => "MSTORE",
    Mstore8 = 0x53 => "MSTORE8",
    Sload = 0x54 => "SLOAD",
    Sstore = 0x55 => "SSTORE",
    Jump = 0x56 => "JUMP",
    Jumpi = 0x57 => "JUMPI",
    Pc = 0x58 => "PC",
    Msize = 0x59 => "MSIZE",
    Gas = 0x5a => "GAS",
    JumpDest = 0x5b => "JUMPDEST",
    Tload = 0x5c => "TLOAD",
    Tstore = 0x5d => "TSTORE",
    Mcopy = 0x5e => "MCOPY",
    Push0 = 0x5f => "PUSH0",
    Push1 = 0x60 => "PUSH1",
    Push2 = 0x61 => "PUSH2",
    Push3 = 0x62 => "PUSH3",
    Push4 = 0x63 => "PUSH4",
    Push5 = 0x64 => "PUSH5",
    Push6 = 0x65 => "PUSH6",
    Push7 = 0x66 => "PUSH7",
    Push8 = 0x67 => "PUSH8",
    Push9 = 0x68 => "PUSH9",
    Push10 = 0x69 => "PUSH10",
    Push11 = 0x6a => "PUSH11",
    Push12 = 0x6b => "PUSH12",
    Push13 = 0x6c => "PUSH13",
    Push14 = 0x6d => "PUSH14",
    Push15 = 0x6e => "PUSH15",
    Push16 = 0x6f => "PUSH16",
    Push17 = 0x70 => "PUSH17",
    Push18 = 0x71 => "PUSH18",
    Push19 = 0x72 => "PUSH19",
    Push20 = 0x73 => "PUSH20",
    Push21 = 0x74 => "PUSH21",
    Push22 = 0x75 => "PUSH22",
    Push23 = 0x76 => "PUSH23",
    Push24 = 0x77 => "PUSH24",
    Push25 = 0x78 => "PUSH25",
    Push26 = 0x79 => "PUSH26",
    Push27 = 0x7a => "PUSH27",
    Push28 = 0x7b => "PUSH28",
    Push29 = 0x7c => "PUSH29",
    Push30 = 0x7d => "PUSH30",
    Push31 = 0x7e => "PUSH31",
    Push32 = 0x7f => "PUSH32",
    Dup1 = 0x80 => "DUP1",
    Dup2 = 0x81 => "DUP2",
    Dup3 = 0x82 => "DUP3",
    Dup4 = 0x83 => "DUP4",
    Dup5 = 0x84 => "DUP5",
    Dup6 = 0x85 => "DUP6",
    Dup7 = 0x86 => "DUP7",
    Dup8 = 0x87 => "DUP8",
    Dup9 = 0x88 => "DUP9",
    Dup10 = 0x89 => "DUP10",
    Dup11 = 0x8a => "DUP11",
    Dup12 = 0x8b => "DUP12",
    Dup13 = 0x8c => "DUP13",
    Dup14 = 0x8d => "DUP14",
    Dup15 = 0x8e => "DUP15",
    Dup16 = 0x8f => "DUP16",
    Swap1 = 0x90 => "SWAP1",
    Swap2 = 0x91 => "SWAP2",
    Swap3 = 0x92 => "SWAP3",
    Swap4 = 0x93 => "SWAP4",
    Swap5 = 0x94 => "SWAP5",
    Swap6 = 0x95 => "SWAP6",
    Swap7 = 0x96 => "SWAP7",
    Swap8 = 0x97 => "SWAP8",
    Swap9 = 0x98 => "SWAP9",
    Swap10 = 0x99 => "SWAP10",
    Swap11 = 0x9a => "SWAP11",
    Swap12 = 0x9b => "SWAP12",
    Swap13 = 0x9c => "SWAP13",
    Swap14 = 0x9d => "SWAP14",
    Swap15 = 0x9e => "SWAP15",
    Swap16 = 0x9f => "SWAP16",
    Log0 = 0xa0 => "LOG0",
    Log1 = 0xa1 => "LOG1",
    Log2 = 0xa2 => "LOG2",
    Log3 = 0xa3 => "LOG3",
    Log4 = 0xa4 => "LOG4",
    Create = 0xf0 => "CREATE",
    Call = 0xf1 => "CALL",
    CallCode = 0xf2 => "CALLCODE",
    Return = 0xf3 => "RETURN",
    DelegateCall = 0xf4 => "DELEGATECALL",
    Create2 = 0xf5 => "CREATE2",
    StaticCall = 0xfa => "STATICCALL",
    Revert = 0xfd => "REVERT",
    Invalid = 0xfe => "INVALID",
    SelfDestruct = 0xff => "SELFDESTRUCT",
}

const PUSH1: u8 = 0x60;
const PUSH32: u8 = 0x7f;
const LOG0: u8 = 0xa0;
const LOG4: u8 = 0xa4;

impl Opcode {
    /// Returns true for PUSH1..PUSH32.
    #[inline]
    pub const fn is_push(self) -> bool {
        matches!(self.byte(), Some(PUSH1..=PUSH32))
    }

    /// Returns the width of the immediate payload: `N` for PUSHN, otherwise 0.
    #[inline]
    pub const fn payload_width(self) -> usize {
        match self.byte() {
            Some(byte @ PUSH1..=PUSH32) => (byte - PUSH1 + 1) as usize,
            _ => 0,
        }
    }

    /// Returns the encoded size. Data blobs are sized by their payload instead.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Data => 0,
            _ => 1 + self.payload_width(),
        }
    }

    /// Returns the topic count of LOG0..LOG4.
    #[inline]
    pub const fn log_topics(self) -> Option<u8> {
        match self.byte() {
            Some(byte @ LOG0..=LOG4) => Some(byte - LOG0),
            _ => None,
        }
    }

    /// Returns true for opcodes that end a basic block during disassembly.
    #[inline]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Stop |
                Self::Return |
                Self::Revert |
                Self::Invalid |
                Self::SelfDestruct |
                Self::Jump
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(byte) => write!(f, "UNKNOWN_{byte:#04x}"),
            _ => f.write_str(self.mnemonic().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_table_is_total() {
        for byte in 0..=u8::MAX {
            let opcode = Opcode::from_byte(byte);
            assert_eq!(opcode.byte(), Some(byte));
            if let Some(mnemonic) = opcode.mnemonic() {
                assert_eq!(Opcode::from_mnemonic(mnemonic), Some(opcode));
            }
        }
    }

    #[test]
    fn test_payload_width() {
        assert_eq!(Opcode::Push1.payload_width(), 1);
        assert_eq!(Opcode::Push3.payload_width(), 3);
        assert_eq!(Opcode::Push32.payload_width(), 32);
        assert_eq!(Opcode::Push0.payload_width(), 0);
        assert_eq!(Opcode::JumpDest.payload_width(), 0);
        assert_eq!(Opcode::Push20.size(), 21);
        assert_eq!(Opcode::Add.size(), 1);
    }

    #[test]
    fn test_aliases_and_display() {
        assert_eq!(Opcode::from_mnemonic("SHA3"), Some(Opcode::Keccak256));
        assert_eq!(Opcode::from_mnemonic("DIFFICULTY"), Some(Opcode::Prevrandao));
        assert_eq!(Opcode::from_mnemonic("BOGUS"), None);
        assert_eq!(Opcode::Log3.log_topics(), Some(3));
        assert_eq!(Opcode::Sstore.log_topics(), None);
        assert_eq!(Opcode::from_byte(0x0c).to_string(), "UNKNOWN_0x0c");
        assert_eq!(Opcode::StaticCall.to_string(), "STATICCALL");
    }
}
