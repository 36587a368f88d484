use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressPhase {
    Parsing = 0,
    Resolving = 1,
    Counting = 2,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProgressPhase::Parsing => "Parsing sources",
            ProgressPhase::Resolving => "Resolving references",
            ProgressPhase::Counting => "Counting relations",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug)]
pub enum ProgressMessage {
    Started {
        phase: ProgressPhase,
        total: usize,
    },
    Progress {
        phase: ProgressPhase,
        current: usize,
        file: Option<String>,
    },
    Finished {
        phase: ProgressPhase,
    },
    Warning(String),
}
