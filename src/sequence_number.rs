use rand::Rng;

type SequenceNumberInnerType = u32;
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SequenceNumber(SequenceNumberInnerType);

impl SequenceNumber {
    // A reply with sequence number 0 expires the whole session, so probes never use it.
    const RESERVED: SequenceNumberInnerType = 0;

    pub(crate) fn start_value() -> SequenceNumber {
        SequenceNumber(1)
    }

    pub(crate) fn random_start_value() -> SequenceNumber {
        SequenceNumber(rand::thread_rng().gen_range(1..=Self::max_value()))
    }

    pub(crate) fn max_value() -> SequenceNumberInnerType {
        SequenceNumberInnerType::MAX
    }

    pub(crate) fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            Self::RESERVED => Self::start_value(),
            next => SequenceNumber(next),
        }
    }
}

impl From<SequenceNumber> for SequenceNumberInnerType {
    fn from(value: SequenceNumber) -> Self {
        value.0
    }
}

impl From<SequenceNumberInnerType> for SequenceNumber {
    fn from(value: SequenceNumberInnerType) -> Self {
        SequenceNumber(value)
    }
}
