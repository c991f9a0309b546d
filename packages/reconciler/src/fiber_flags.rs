use bitflags::bitflags;

bitflags! {
    /// Pending side effects recorded on a fiber during render and applied
    /// by the commit engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const NoFlags      = 0b0000000;
        const Placement    = 0b0000001;
        const Update       = 0b0000010;
        const Deletion     = 0b0000100;
        const ContentReset = 0b0001000;
        const Callback     = 0b0010000;
        const ErrCaptured  = 0b0100000;
        const Ref          = 0b1000000;
    }
}

/// Effects handled by the host-mutation pass.
pub fn get_mutation_mask() -> Flags {
    Flags::Placement | Flags::Update | Flags::Deletion | Flags::ContentReset
}

/// Effects handled by the lifecycle pass.
pub fn get_lifecycle_mask() -> Flags {
    Flags::Placement | Flags::Update | Flags::Callback | Flags::Ref
}
