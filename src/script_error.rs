//! The result codes an evaluation reports, and the slot it reports them into.

use thiserror::Error;
use tracing::warn;

/// Exactly one of these is recorded per evaluation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
#[repr(i32)]
pub enum ScriptError {
    #[error("Ok")]
    Ok = 0,

    #[error("unknown error")]
    UnknownError,

    #[error("script evaluation failed")]
    EvalFalse,

    #[error("OP_RETURN encountered")]
    OpReturn,

    // Max sizes
    #[error("Script size exceeded maximum")]
    ScriptSize,

    #[error("push size exceeded maximum")]
    PushSize,

    #[error("operation count exceeded maximum")]
    OpCount,

    #[error("stack size exceeded maximum")]
    StackSize,

    #[error("signature count exceeded maximum")]
    SigCount,

    #[error("public key count exceeded maximum")]
    PubKeyCount,

    // Failed verify operations
    #[error("verify operation failed")]
    Verify,

    #[error("equal verify operation failed")]
    EqualVerify,

    #[error("check multisig verify operation failed")]
    CheckMultisigVerify,

    #[error("check sig verify operation failed")]
    CheckSigVerify,

    #[error("num equal verify operation failed")]
    NumEqualVerify,

    // Logical/Format/Canonical errors
    #[error("bad opcode encountered")]
    BadOpcode,

    #[error("disabled opcode encountered")]
    DisabledOpcode,

    #[error("invalid stack operation encountered")]
    InvalidStackOperation,

    #[error("invalid altstack operation encountered")]
    InvalidAltstackOperation,

    #[error("unbalanced conditional encountered")]
    UnbalancedConditional,

    // OP_CHECKLOCKTIMEVERIFY
    #[error("negative lock time encountered")]
    NegativeLockTime,

    #[error("unsatisfied locktime condition")]
    UnsatisfiedLockTime,

    // BIP62
    #[error("signature hash type error")]
    SigHashType,

    #[error("signature DER encoding error")]
    SigDER,

    #[error("minimal data requirement not met")]
    MinimalData,

    #[error("signature push only requirement not met")]
    SigPushOnly,

    #[error("signature s value is too high")]
    SigHighS,

    #[error("signature null dummy error")]
    SigNullDummy,

    #[error("public key type error")]
    PubKeyType,

    // softfork safeness
    #[error("discouraged upgradable NOPs encountered")]
    DiscourageUpgradableNOPs,

    // segwit
    #[error("witness program hash mismatch")]
    WitnessProgramMismatch,

    #[error("witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,

    #[error("script number error")]
    ScriptNum,
}

/// Caller-owned storage for the outcome of one evaluation.
///
/// The first code written wins, and a second write is logged and ignored. The interpreter
/// resets the sink before it starts and then writes exactly once.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ErrorSink {
    code: Option<ScriptError>,
}

impl ErrorSink {
    pub fn new() -> Self {
        ErrorSink::default()
    }

    /// Records `code` unless something was recorded already. Returns whether it was recorded.
    pub fn set(&mut self, code: ScriptError) -> bool {
        match self.code {
            None => {
                self.code = Some(code);
                true
            }
            Some(existing) => {
                warn!(?existing, ignored = ?code, "error sink already latched");
                false
            }
        }
    }

    pub fn get(&self) -> Option<ScriptError> {
        self.code
    }

    pub fn is_ok(&self) -> bool {
        self.code == Some(ScriptError::Ok)
    }

    pub fn is_set(&self) -> bool {
        self.code.is_some()
    }

    pub fn reset(&mut self) {
        self.code = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let mut sink = ErrorSink::new();
        assert_eq!(sink.get(), None);
        assert!(!sink.is_ok());
        assert!(sink.set(ScriptError::EvalFalse));
        assert!(!sink.set(ScriptError::Ok));
        assert_eq!(sink.get(), Some(ScriptError::EvalFalse));
        sink.reset();
        assert!(sink.set(ScriptError::Ok));
        assert!(sink.is_ok());
    }

    #[test]
    fn codes_keep_their_numbering() {
        assert_eq!(ScriptError::Ok as i32, 0);
        assert_eq!(ScriptError::EvalFalse as i32, 2);
        assert_eq!(ScriptError::ScriptNum.to_string(), "script number error");
    }
}
