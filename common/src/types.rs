#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    On,
    Off,
}

impl DesiredState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }

    pub fn level(self) -> OutputLevel {
        match self {
            Self::On => OutputLevel::Active,
            Self::Off => OutputLevel::Inactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Active,
    Inactive,
}

impl OutputLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fire,
    Wait(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub applied: DesiredState,
    pub level: OutputLevel,
    pub next_state: DesiredState,
    pub next_alarm_epoch: i64,
}
