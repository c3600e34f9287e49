//! One readable line per instruction.

use std::fmt::Write as _;

use crate::chunk::{Constant, Prototype};
use crate::instruction::{fb2int, is_constant, Instruction, OpCode, BITRK, FIELDS_PER_FLUSH};

/// Operand labels for the instruction at `pc` of `proto`.
struct Labels<'a> {
    proto: &'a Prototype,
    pc: u32,
}

impl Labels<'_> {
    fn reg(&self, r: u32) -> String {
        match self.proto.local_name(r, self.pc) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("R{r}"),
        }
    }

    /// `R(from)..R(to)` inclusive, or the single register when they match.
    fn range(&self, from: u32, to: u32) -> String {
        if from == to {
            self.reg(from)
        } else {
            format!("{}..{}", self.reg(from), self.reg(to))
        }
    }

    fn upval(&self, u: u32) -> String {
        match self.proto.upvalue_names.get(u as usize) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("U{u}"),
        }
    }

    fn constant(&self, k: u32) -> String {
        match self.proto.constants.get(k as usize) {
            Some(constant) => render_constant(constant),
            None => format!("K{k}"),
        }
    }

    fn rk(&self, x: u32) -> String {
        if is_constant(x) {
            self.constant(x & !BITRK)
        } else {
            self.reg(x)
        }
    }
}

pub fn render_constant(constant: &Constant) -> String {
    match constant {
        Constant::Nil => "nil".to_string(),
        Constant::Boolean(b) => b.to_string(),
        Constant::Number(n) => render_number(*n),
        Constant::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
    }
}

fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Render the instruction at `pc`. Jump targets are printed as flat
/// addresses when the prototype has been rebased, else as `pc N`.
pub fn render(proto: &Prototype, pc: u32) -> String {
    let Some(&ins) = proto.code.get(pc as usize) else {
        return "<no instruction>".to_string();
    };
    let Ok(op) = ins.opcode() else {
        return format!("<invalid opcode {}>", ins.raw_opcode());
    };

    let l = Labels { proto, pc };
    let (a, b, c) = (ins.a(), ins.b(), ins.c());
    let target = |offset: i32| {
        let to = (i64::from(pc) + 1 + i64::from(offset)).max(0);
        match proto.base {
            Some(base) => format!("{}", i64::from(base) + to),
            None => format!("pc {to}"),
        }
    };
    let next_ax = || {
        proto
            .code
            .get(pc as usize + 1)
            .filter(|next| next.opcode().ok() == Some(OpCode::ExtraArg))
            .map(|next| next.ax())
    };

    let text = match op {
        OpCode::Move => format!("{} = {}", l.reg(a), l.reg(b)),
        OpCode::LoadK => format!("{} = {}", l.reg(a), l.constant(ins.bx())),
        OpCode::LoadKx => match next_ax() {
            Some(k) => format!("{} = {}", l.reg(a), l.constant(k)),
            None => format!("{} = K[extra arg]", l.reg(a)),
        },
        OpCode::LoadBool => {
            let mut s = format!("{} = {}", l.reg(a), b != 0);
            if c != 0 {
                s.push_str("; skip next");
            }
            s
        }
        OpCode::LoadNil => format!("{} = nil", l.range(a, a + b)),
        OpCode::GetUpval => format!("{} = {}", l.reg(a), l.upval(b)),
        OpCode::GetTabUp => format!("{} = {}[{}]", l.reg(a), l.upval(b), l.rk(c)),
        OpCode::GetTable => format!("{} = {}[{}]", l.reg(a), l.reg(b), l.rk(c)),
        OpCode::SetTabUp => format!("{}[{}] = {}", l.upval(a), l.rk(b), l.rk(c)),
        OpCode::SetUpval => format!("{} = {}", l.upval(b), l.reg(a)),
        OpCode::SetTable => format!("{}[{}] = {}", l.reg(a), l.rk(b), l.rk(c)),
        OpCode::NewTable => format!(
            "{} = {{}} (array {}, hash {})",
            l.reg(a),
            fb2int(b),
            fb2int(c)
        ),
        OpCode::SelfOp => format!(
            "{} = {}; {} = {}[{}]",
            l.reg(a + 1),
            l.reg(b),
            l.reg(a),
            l.reg(b),
            l.rk(c)
        ),
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
            let sym = match op {
                OpCode::Add => "+",
                OpCode::Sub => "-",
                OpCode::Mul => "*",
                OpCode::Div => "/",
                OpCode::Mod => "%",
                _ => "^",
            };
            format!("{} = {} {sym} {}", l.reg(a), l.rk(b), l.rk(c))
        }
        OpCode::Unm => format!("{} = -{}", l.reg(a), l.reg(b)),
        OpCode::Not => format!("{} = not {}", l.reg(a), l.reg(b)),
        OpCode::Len => format!("{} = #{}", l.reg(a), l.reg(b)),
        OpCode::Concat => {
            let parts: Vec<_> = (b..=c).map(|r| l.reg(r)).collect();
            format!("{} = {}", l.reg(a), parts.join(" .. "))
        }
        OpCode::Jmp => {
            let mut s = format!("goto {}", target(ins.sbx()));
            if a != 0 {
                let _ = write!(s, "; close upvalues >= {}", l.reg(a - 1));
            }
            s
        }
        OpCode::Eq | OpCode::Lt | OpCode::Le => {
            let sym = match op {
                OpCode::Eq => "==",
                OpCode::Lt => "<",
                _ => "<=",
            };
            let negate = if a == 0 { "" } else { "not " };
            format!("if {negate}({} {sym} {}) then skip next", l.rk(b), l.rk(c))
        }
        OpCode::Test => {
            let negate = if c == 0 { "" } else { "not " };
            format!("if {negate}{} then skip next", l.reg(a))
        }
        OpCode::TestSet => {
            let negate = if c == 0 { "not " } else { "" };
            format!(
                "if {negate}{} then {} = {} else skip next",
                l.reg(b),
                l.reg(a),
                l.reg(b)
            )
        }
        OpCode::Call | OpCode::TailCall => {
            let args = match b {
                0 => format!("{}..top", l.reg(a + 1)),
                1 => String::new(),
                n => l.range(a + 1, a + n - 1),
            };
            let call = format!("{}({args})", l.reg(a));
            if op == OpCode::TailCall {
                format!("return {call}")
            } else {
                match c {
                    0 => format!("{}..top = {call}", l.reg(a)),
                    1 => call,
                    n => format!("{} = {call}", l.range(a, a + n - 2)),
                }
            }
        }
        OpCode::Return => match b {
            0 => format!("return {}..top", l.reg(a)),
            1 => "return".to_string(),
            n => format!("return {}", l.range(a, a + n - 2)),
        },
        OpCode::ForLoop => format!(
            "{a0} += {step}; if {a0} <= {limit} then {{ {var} = {a0}; goto {to} }}",
            a0 = l.reg(a),
            step = l.reg(a + 2),
            limit = l.reg(a + 1),
            var = l.reg(a + 3),
            to = target(ins.sbx()),
        ),
        OpCode::ForPrep => format!(
            "{} -= {}; goto {}",
            l.reg(a),
            l.reg(a + 2),
            target(ins.sbx())
        ),
        OpCode::TForCall => format!(
            "{} = {}({}, {})",
            l.range(a + 3, a + 2 + c.max(1)),
            l.reg(a),
            l.reg(a + 1),
            l.reg(a + 2)
        ),
        OpCode::TForLoop => format!(
            "if {} ~= nil then {{ {} = {}; goto {} }}",
            l.reg(a + 1),
            l.reg(a),
            l.reg(a + 1),
            target(ins.sbx())
        ),
        OpCode::SetList => {
            let block = if c == 0 { next_ax().unwrap_or(0) } else { c };
            let first = u64::from(block.saturating_sub(1)) * u64::from(FIELDS_PER_FLUSH) + 1;
            match b {
                0 => format!("{}[{first}..] = {}..top", l.reg(a), l.reg(a + 1)),
                n => format!(
                    "{}[{first}..{}] = {}",
                    l.reg(a),
                    first + u64::from(n) - 1,
                    l.range(a + 1, a + n)
                ),
            }
        }
        OpCode::Closure => format!("{} = closure(proto {})", l.reg(a), ins.bx()),
        OpCode::VarArg => match b {
            0 => format!("{}..top = ...", l.reg(a)),
            1 => "... (discarded)".to_string(),
            n => format!("{} = ...", l.range(a, a + n - 2)),
        },
        OpCode::ExtraArg => format!("extra arg {}", ins.ax()),
    };

    format!("{:<9} {text}", op.mnemonic())
}

/// Raw instruction word as DAP `instructionBytes`.
pub fn instruction_bytes(ins: Instruction) -> String {
    let bytes = ins.0.to_le_bytes();
    format!(
        "{:02x} {:02x} {:02x} {:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}
