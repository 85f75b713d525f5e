//! Named consensus rule violations.

use std::fmt;

/// Every way a block can break a consensus rule.
///
/// Variants are stable: callers match on them (the consensus loop treats
/// [`ConsensusError::BadWitnessNonceSize`] differently from everything else) and
/// the machine code returned by [`ConsensusError::code`] never changes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConsensusError {
    BadVersion,
    BadPrevBlock,
    KnownInvalid,
    BadDiffBits,
    HighHash,
    CheckpointViolation,
    TimeTooNew,
    BlockTimestampTooEarly,
    BlockTimestampTooFar,
    BlockTimeBeforeTrx,
    ProofOfWorkTooHigh,
    BadBlockLength,
    BadCoinbaseMissing,
    BadMultipleCoinbase,
    BadMerkleRoot,
    BadTransactionDuplicate,
    BadBlockSigOps,
    BadCoinbaseHeight,
    BadCoinbaseSize,
    BadCoinbaseAmount,
    BadWitnessNonceSize,
    BadWitnessMerkleMatch,
    UnexpectedWitness,
    BadTransactionNoInput,
    BadTransactionNoOutput,
    BadTransactionOversize,
    BadTransactionNegativeOutput,
    BadTransactionTooLargeOutput,
    BadTransactionTooLargeTotalOutput,
    BadTransactionDuplicateInputs,
    BadTransactionNullPrevout,
    BadTransactionEmptyOutput,
    BadTransactionNonFinal,
    BadTransactionBip30,
    BadTransactionMissingInput,
    BadTransactionPrematureCoinbaseSpending,
    BadTransactionPrematureCoinstakeSpending,
    BadTransactionInputValueOutOfRange,
    BadTransactionEarlyTimestamp,
    BadTransactionInBelowOut,
    BadTransactionNegativeFee,
    BadTransactionFeeOutOfRange,
    BadTransactionScriptError,
    BadStakeBlock,
    BadMultipleCoinstake,
    BadBlockSignature,
    BadCoinstakeAmount,
    NonCoinstake,
    CoinstakeVerifySignatureFailed,
    ReadTxPrevFailed,
    InvalidStakeDepth,
    MinAgeViolation,
    StakeTimeViolation,
    StakeHashInvalidTarget,
    PrevStakeNull,
    ModifierNotFound,
    FailedSelectBlock,
}

impl ConsensusError {
    /// Stable machine-checkable code.
    pub fn code(self) -> &'static str {
        self.describe().0
    }

    pub fn message(self) -> &'static str {
        self.describe().1
    }

    fn describe(self) -> (&'static str, &'static str) {
        use ConsensusError::*;
        match self {
            BadVersion => ("bad-version", "block version rejected"),
            BadPrevBlock => ("bad-prevblk", "previous block does not match the tip"),
            KnownInvalid => ("duplicate-invalid", "block was previously marked invalid"),
            BadDiffBits => ("bad-diffbits", "incorrect target bits"),
            HighHash => ("high-hash", "proof of work failed"),
            CheckpointViolation => ("checkpoint-violation", "block does not match checkpoint"),
            TimeTooNew => ("time-too-new", "timestamp too far in the future"),
            BlockTimestampTooEarly => ("time-too-old", "block timestamp too early"),
            BlockTimestampTooFar => ("time-too-far", "block timestamp too far in the future"),
            BlockTimeBeforeTrx => ("block-time-before-trx", "block timestamp earlier than transaction timestamp"),
            ProofOfWorkTooHigh => ("proof-of-work-too-high", "proof of work too high"),
            BadBlockLength => ("bad-blk-length", "block size limits failed"),
            BadCoinbaseMissing => ("bad-cb-missing", "first transaction is not coinbase"),
            BadMultipleCoinbase => ("bad-cb-multiple", "more than one coinbase"),
            BadMerkleRoot => ("bad-txnmrklroot", "hashMerkleRoot mismatch"),
            BadTransactionDuplicate => ("bad-txns-duplicate", "duplicate transaction"),
            BadBlockSigOps => ("bad-blk-sigops", "out-of-bounds sigops count"),
            BadCoinbaseHeight => ("bad-cb-height", "block height mismatch in coinbase"),
            BadCoinbaseSize => ("bad-cb-length", "coinbase script length out of range"),
            BadCoinbaseAmount => ("bad-cb-amount", "coinbase pays too much"),
            BadWitnessNonceSize => ("bad-witness-nonce-size", "invalid witness nonce size"),
            BadWitnessMerkleMatch => ("bad-witness-merkle-match", "witness merkle commitment mismatch"),
            UnexpectedWitness => ("unexpected-witness", "unexpected witness data found"),
            BadTransactionNoInput => ("bad-txns-vin-empty", "transaction has no inputs"),
            BadTransactionNoOutput => ("bad-txns-vout-empty", "transaction has no outputs"),
            BadTransactionOversize => ("bad-txns-oversize", "transaction too large"),
            BadTransactionNegativeOutput => ("bad-txns-vout-negative", "transaction output negative"),
            BadTransactionTooLargeOutput => ("bad-txns-vout-toolarge", "transaction output too large"),
            BadTransactionTooLargeTotalOutput => ("bad-txns-txouttotal-toolarge", "transaction total output too large"),
            BadTransactionDuplicateInputs => ("bad-txns-inputs-duplicate", "duplicate inputs"),
            BadTransactionNullPrevout => ("bad-txns-prevout-null", "non-coinbase input with null prevout"),
            BadTransactionEmptyOutput => ("user-txout-empty", "empty output in a user transaction"),
            BadTransactionNonFinal => ("bad-txns-nonfinal", "non-final transaction"),
            BadTransactionBip30 => ("bad-txns-BIP30", "tried to overwrite transaction"),
            BadTransactionMissingInput => ("bad-txns-inputs-missingorspent", "input missing or spent"),
            BadTransactionPrematureCoinbaseSpending => ("bad-txns-premature-spend-of-coinbase", "tried to spend coinbase before maturity"),
            BadTransactionPrematureCoinstakeSpending => ("bad-txns-premature-spend-of-coinstake", "tried to spend coinstake before maturity"),
            BadTransactionInputValueOutOfRange => ("bad-txns-inputvalues-outofrange", "input value out of range"),
            BadTransactionEarlyTimestamp => ("bad-txns-early-timestamp", "transaction timestamp earlier than input transaction"),
            BadTransactionInBelowOut => ("bad-txns-in-belowout", "input value below output value"),
            BadTransactionNegativeFee => ("bad-txns-fee-negative", "negative fee"),
            BadTransactionFeeOutOfRange => ("bad-txns-fee-outofrange", "fee out of range"),
            BadTransactionScriptError => ("bad-txns-script-failed", "a script verification failed"),
            BadStakeBlock => ("bad-stake-block", "bad stake block"),
            BadMultipleCoinstake => ("bad-cs-multiple", "more than one coinstake"),
            BadBlockSignature => ("bad-blk-signature", "bad block signature"),
            BadCoinstakeAmount => ("bad-cs-amount", "coinstake pays too much"),
            NonCoinstake => ("non-coinstake", "non-coinstake"),
            CoinstakeVerifySignatureFailed => ("verify-cs-signature-failed", "coinstake signature verification failed"),
            ReadTxPrevFailed => ("read-txprev-failed", "read previous transaction failed"),
            InvalidStakeDepth => ("invalid-stake-depth", "tried to stake at depth below minimum confirmations"),
            MinAgeViolation => ("min-age-violation", "minimum age violation"),
            StakeTimeViolation => ("stake-time-violation", "stake time violation"),
            StakeHashInvalidTarget => ("stake-hash-invalid-target", "proof-of-stake hash did not meet target"),
            PrevStakeNull => ("prev-stake-null", "previous stake is not found"),
            ModifierNotFound => ("modifier-not-found", "unable to get last modifier"),
            FailedSelectBlock => ("failed-select-block", "unable to select block"),
        }
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ConsensusError {}
