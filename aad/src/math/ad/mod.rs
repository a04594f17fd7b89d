pub mod mode;
pub mod node;
pub mod number;
pub mod propagation;
pub mod tape;

pub use mode::{output_mode, set_num_outputs, OutputMode, OutputModeGuard};
pub use node::{Node, OutputSlots};
pub use number::{
    exp, fabs, log, max, min, normal_cdf, normal_dens, pow, put_on_tape, sqrt, to_numbers,
    to_values, Number, Operand,
};
pub use propagation::{
    propagate_adjoints, propagate_adjoints_multi, propagate_mark_to_start,
    propagate_multi_to_start,
};
pub use tape::{Checkpoint, NodeRef, Tape, TapeScope};
