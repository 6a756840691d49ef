use std::str::FromStr;

use tomasim::inst::{ArchReg, Imm, Inst, Label, MemRef};
use tomasim::program::Program;

#[test]
fn test_parse_program_with_labels() {
    let prog = Program::from_str(
        "; count down to zero\n\
         \tli t0, 3\n\
         loop:\n\
         \taddi t0, t0, -1\n\
         \tbne t0, zero, loop\n\
         \thalt\n",
    )
    .unwrap();

    assert_eq!(prog.len(), 4);
    assert_eq!(prog.labels[&Label("loop".to_string())], 1);
    assert_eq!(
        prog.insts[2],
        Inst::BranchIfNotEqual(ArchReg::T0, ArchReg::Zero, 1)
    );
}

#[test]
fn test_forward_label_reference() {
    let prog = Program::from_str(
        "beq a0, zero, end\n\
         li a0, 1\n\
         end:\n\
         halt",
    )
    .unwrap();

    assert_eq!(prog.insts[0], Inst::BranchIfEqual(ArchReg::A0, ArchReg::Zero, 2));
}

#[test]
fn test_label_past_last_instruction() {
    // Jumping to a trailing label runs off the program, which fetches as a
    // halt.
    let prog = Program::from_str(
        "j end\n\
         li a0, 1\n\
         end:\n",
    )
    .unwrap();

    assert_eq!(prog.insts[0], Inst::Jump(2));
    assert_eq!(prog.len(), 2);
    assert!(prog.fetch(2).is_none());
}

#[test]
fn test_comments_and_blank_lines_ignored() {
    let prog = Program::from_str(
        "\n\
         ; full line comment\n\
         li a0, 1 ; trailing comment\n\
         \n\
         halt\n",
    )
    .unwrap();
    assert_eq!(prog.len(), 2);
    assert_eq!(prog.insts[0], Inst::LoadImm(ArchReg::A0, Imm(1)));
}

#[test]
fn test_memory_operand_forms() {
    let prog = Program::from_str(
        "lw a0, [sp]\n\
         lw a1, [sp + 8]\n\
         sb a2, [t0 - 1]\n\
         halt",
    )
    .unwrap();

    assert_eq!(
        prog.insts[0],
        Inst::LoadWord(
            ArchReg::A0,
            MemRef {
                base: ArchReg::Sp,
                offset: Imm(0)
            }
        )
    );
    assert_eq!(
        prog.insts[2],
        Inst::StoreByte(
            ArchReg::A2,
            MemRef {
                base: ArchReg::T0,
                offset: Imm(1u32.wrapping_neg())
            }
        )
    );
}

#[test]
fn test_errors_carry_line_numbers() {
    let err = Program::from_str("li a0, 1\nfrobnicate a0\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("line 2"), "unexpected error: {err}");

    let err = Program::from_str("beq a0, a1, nowhere\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown label"), "unexpected error: {err}");
}

#[test]
fn test_duplicate_label_rejected() {
    let err = Program::from_str("x:\nli a0, 1\nx:\nhalt\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("duplicate label"), "unexpected error: {err}");
}
