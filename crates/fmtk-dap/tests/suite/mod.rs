mod breakpoint_sync;
mod disassemble;
mod launch_lifecycle;
mod prompt_reactions;
mod requests;
