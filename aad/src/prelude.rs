pub use crate::{
    math::ad::{
        exp, fabs, log, max, min, normal_cdf, normal_dens, pow, propagate_adjoints,
        propagate_adjoints_multi, propagate_mark_to_start, propagate_multi_to_start,
        put_on_tape, set_num_outputs, sqrt, to_numbers, to_values, Checkpoint, NodeRef, Number,
        Operand, OutputModeGuard, Tape, TapeScope,
    },
    utils::{errors::*, num::*},
};
