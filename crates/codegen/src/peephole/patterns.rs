//! The peephole passes.
//!
//! Every pass scans windows over the lines and records the edits of the windows that match. A
//! window only matches instructions that are adjacent in the program, because labels take part
//! in the windows too.

use super::{Edits, Line, Modification};

/// `sta ESTACK_LO,x / dex / inx / lda ESTACK_LO,x`: the value is still in A.
pub(super) fn useless_stack_byte_writes(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for w in lines.windows(4) {
        if is(&w[0], "sta", "ESTACK_LO,x")
            && w[1].mnemonic() == "dex"
            && w[2].mnemonic() == "inx"
            && is(&w[3], "lda", "ESTACK_LO,x")
        {
            edits.remove(&w[1..4]);
        }
    }
    edits
}

/// An increment directly followed by the matching decrement, or the other way around.
pub(super) fn inc_dec(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for w in lines.windows(2) {
        let cancels = matches!(
            (w[0].mnemonic(), w[1].mnemonic()),
            ("inx", "dex") | ("dex", "inx") | ("iny", "dey") | ("dey", "iny")
        );
        if cancels {
            edits.remove(w);
        }
    }
    edits
}

/// Reloading the `when` subject between two comparisons; `cmp` and branches keep A.
pub(super) fn cmp_sequence(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for w in lines.windows(4) {
        if is(&w[0], "lda", "ESTACK_LO+1,x")
            && w[1].mnemonic() == "cmp"
            && w[2].mnemonic() == "beq"
            && is(&w[3], "lda", "ESTACK_LO+1,x")
        {
            edits.remove(&w[3..4]);
        }
    }
    edits
}

/// A load of the value that the register already holds.
///
/// When a branch follows, the load also sets the flags for it; the load is only removed if the
/// line before already did the same kind of load.
pub(super) fn store_load_same(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for i in 1..lines.len() {
        let (first, second) = (&lines[i - 1], &lines[i]);
        let pair = matches!(
            (first.mnemonic(), second.mnemonic()),
            ("sta", "lda")
                | ("stx", "ldx")
                | ("sty", "ldy")
                | ("lda", "lda")
                | ("ldx", "ldx")
                | ("ldy", "ldy")
        );
        if !pair || first.operand() != second.operand() || reads_own_index(second) {
            continue;
        }
        let before = i.checked_sub(2).map(|before| lines[before].mnemonic());
        if lines.get(i + 1).is_some_and(Line::is_branch) && before != Some(second.mnemonic()) {
            continue;
        }
        edits.remove(std::slice::from_ref(second));
    }
    edits
}

/// A subroutine call directly followed by a return becomes a jump.
pub(super) fn jsr_rts(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for w in lines.windows(2) {
        if w[0].mnemonic() == "jsr" && w[1].mnemonic() == "rts" {
            let jump = format!("\tjmp  {}", w[0].operand());
            edits.add([Modification::replace(w[0].index, jump), Modification::remove(w[1].index)]);
        }
    }
    edits
}

/// Repeated assignments of values that are already in registers or memory.
pub(super) fn same_assignments(lines: &[Line<'_>]) -> Edits {
    let mut edits = Edits::default();
    for start in 0..lines.len() {
        let w = &lines[start..lines.len().min(start + 14)];
        same_word_assignment(w, &mut edits);
        same_byte_assignment(w, &mut edits);
        same_float_copy(w, &mut edits);

        let overlapping =
            return_value_shuttle(w, &mut edits) || store_twice_load_twice(w, &mut edits);
        if !overlapping {
            store_then_load(w, &mut edits);
        }
    }
    edits
}

/// `lda a / ldy b / sta .. / sty ..` twice: the second loads are redundant.
fn same_word_assignment(w: &[Line<'_>], edits: &mut Edits) {
    let shape = ["lda", "ldy", "sta", "sty", "lda", "ldy", "sta", "sty"];
    if !has_shape(w, &shape) {
        return;
    }
    let clobbered = [&w[2], &w[3]].iter().any(|store| {
        aliases(w[0].operand(), store.operand()) || aliases(w[1].operand(), store.operand())
    });
    if w[0].operand() == w[4].operand() && w[1].operand() == w[5].operand() && !clobbered {
        edits.remove(&w[4..6]);
    }
}

/// `lda a / sta .. / lda a / sta ..`: the second load is redundant.
fn same_byte_assignment(w: &[Line<'_>], edits: &mut Edits) {
    if has_shape(w, &["lda", "sta", "lda", "sta"])
        && w[0].operand() == w[2].operand()
        && !aliases(w[0].operand(), w[1].operand())
    {
        edits.remove(&w[2..3]);
    }
}

/// Two float copies from the same source: the second sets up the source pointer again.
fn same_float_copy(w: &[Line<'_>], edits: &mut Edits) {
    let copy = ["lda", "ldy", "sta", "sty", "lda", "ldy", "jsr"];
    let is_copy =
        |part: &[Line<'_>]| has_shape(part, &copy) && part[6].operand() == "floats.copy_float";
    if w.len() >= 14
        && is_copy(&w[..7])
        && is_copy(&w[7..14])
        && (0..4).all(|i| w[i].operand() == w[7 + i].operand())
    {
        edits.remove(&w[7..11]);
    }
}

/// Storing a return value in an intermediate location only to load it again and store it
/// elsewhere. Returns `true` if the window matched.
fn return_value_shuttle(w: &[Line<'_>], edits: &mut Edits) -> bool {
    let shape = w.len() >= 6
        && w[0].is_store()
        && w[1].is_store()
        && w[2].is_load()
        && w[3].is_load()
        && w[4].is_store()
        && w[5].is_store();
    if !shape {
        return false;
    }
    let (first, second) = (w[0].register(), w[1].register());
    if first != w[2].register()
        || first != w[4].register()
        || second != w[3].register()
        || second != w[5].register()
    {
        return false;
    }
    let (a, b) = (w[0].operand(), w[1].operand());
    if a.contains("retval_interm")
        && b.contains("retval_interm")
        && a == w[2].operand()
        && b == w[3].operand()
    {
        edits.remove(&w[0..4]);
        return true;
    }
    false
}

/// `st? a / st? b / ld? a / ld? b` with the same registers: both loads are redundant. Returns
/// `true` if the window matched.
fn store_twice_load_twice(w: &[Line<'_>], edits: &mut Edits) -> bool {
    let shape = w.len() >= 4
        && w[0].is_store()
        && w[1].is_store()
        && w[2].is_load()
        && w[3].is_load();
    if !shape
        || w[0].register() != w[2].register()
        || w[1].register() != w[3].register()
        || w[0].operand() != w[2].operand()
        || w[1].operand() != w[3].operand()
        || w[0].operand() == w[1].operand()
    {
        return false;
    }
    if w.get(4).is_some_and(Line::is_branch) {
        edits.remove(&w[2..3]);
    } else {
        edits.remove(&w[2..4]);
    }
    true
}

/// Reloading or restoring a value that is still in its register.
fn store_then_load(w: &[Line<'_>], edits: &mut Edits) {
    let [first, second, third, ..] = w else { return };
    if !first.is_store() || (second.is_store() && second.operand() == first.operand()) {
        return;
    }
    let (reg, value) = (first.register(), first.operand());
    // A load into the index register changes the address of an indexed operand.
    if let Some(index) = second.register().filter(|_| second.is_load())
        && value.ends_with(&format!(",{index}"))
    {
        return;
    }

    // `st? a / st? b / ld? a`
    if second.is_store()
        && third.is_load()
        && !w.get(3).is_some_and(Line::is_branch)
        && third.register() == reg
        && third.operand() == value
    {
        edits.remove(std::slice::from_ref(third));
        return;
    }

    // `st? a / (ld|st) b / st? a`, where the middle line leaves the register alone
    let keeps_register = second.operand() != value
        && (second.is_store() || second.is_load() && second.register() != reg);
    if keeps_register && third.is_store() && third.register() == reg && third.operand() == value {
        edits.remove(std::slice::from_ref(third));
        return;
    }

    // `sta a / ld[xy] a / sta a`
    if first.mnemonic() == "sta"
        && second.is_load()
        && second.operand() == value
        && is(third, "sta", value)
        && let Some(index @ ('x' | 'y')) = second.register()
    {
        edits.add([
            Modification::replace(second.index, format!("\tta{index}")),
            Modification::remove(third.index),
        ]);
    }
}

/// Returns `true` if a load is indexed by the register it loads, so that repeating it reads
/// another address.
fn reads_own_index(load: &Line<'_>) -> bool {
    load.is_load()
        && load.register().is_some_and(|reg| load.operand().ends_with(&format!(",{reg}")))
}

fn is(line: &Line<'_>, mnemonic: &str, operand: &str) -> bool {
    line.mnemonic() == mnemonic && line.operand() == operand
}

fn has_shape(lines: &[Line<'_>], mnemonics: &[&str]) -> bool {
    lines.len() >= mnemonics.len()
        && lines.iter().zip(mnemonics).all(|(line, &m)| line.mnemonic() == m)
}

/// Returns `true` if a store to `stored` may change what `loaded` reads, e.g. by writing the
/// pointer of an indirect load.
fn aliases(loaded: &str, stored: &str) -> bool {
    let base = stored.split([',', '+']).next().unwrap_or(stored).trim_matches(['(', ')']);
    loaded != stored && !base.is_empty() && loaded.contains(base)
}

#[cfg(test)]
mod tests {
    use super::super::PeepholeOptimizer;

    fn optimize(text: &[&str]) -> Vec<String> {
        let mut lines: Vec<String> = text.iter().map(|line| line.to_string()).collect();
        PeepholeOptimizer::optimize(&mut lines);
        lines
    }

    #[test]
    fn inc_dec() {
        assert_eq!(optimize(&["\tldy  #$00", "\tiny", "\tdey", "\trts"]), ["\tldy  #$00", "\trts"]);
    }

    #[test]
    fn when_subject_reload() {
        let out = optimize(&[
            "\tlda  ESTACK_LO+1,x",
            "\tcmp  #$01",
            "\tbeq  l_one",
            "\tlda  ESTACK_LO+1,x",
            "\tcmp  #$02",
            "\tbeq  l_two",
        ]);
        assert_eq!(out, [
            "\tlda  ESTACK_LO+1,x",
            "\tcmp  #$01",
            "\tbeq  l_one",
            "\tcmp  #$02",
            "\tbeq  l_two",
        ]);
    }

    #[test]
    fn store_load_same() {
        let out = optimize(&["\tlda  #$05", "\tsta  main.x", "\tlda  main.x", "\tjsr  sys.print_u8"]);
        assert_eq!(out, ["\tlda  #$05", "\tsta  main.x", "\tjsr  sys.print_u8"]);

        // The load sets the flags for the branch.
        let kept = ["\tinc  main.y", "\tsta  main.x", "\tlda  main.x", "\tbne  +"];
        assert_eq!(optimize(&kept), kept);
    }

    #[test]
    fn duplicated_word_assignment() {
        let out = optimize(&[
            "\tlda  main.w",
            "\tldy  main.w+1",
            "\tsta  main.a",
            "\tsty  main.a+1",
            "\tlda  main.w",
            "\tldy  main.w+1",
            "\tsta  main.b",
            "\tsty  main.b+1",
        ]);
        assert_eq!(out, [
            "\tlda  main.w",
            "\tldy  main.w+1",
            "\tsta  main.a",
            "\tsty  main.a+1",
            "\tsta  main.b",
            "\tsty  main.b+1",
        ]);
    }

    #[test]
    fn matches_at_end_of_program() {
        assert_eq!(optimize(&["\tsta  main.x", "\tlda  main.x"]), ["\tsta  main.x"]);
        assert_eq!(optimize(&["\tsta  main.x", "\tsty  main.y", "\tlda  main.x"]), [
            "\tsta  main.x",
            "\tsty  main.y"
        ]);
        let copies = ["\tlda  main.a", "\tsta  main.b", "\tlda  main.a", "\tsta  main.c"];
        assert_eq!(optimize(&copies), ["\tlda  main.a", "\tsta  main.b", "\tsta  main.c"]);
    }

    #[test]
    fn reload_through_changed_index() {
        let text = ["\tldy  (ZP_SCRATCH_W1),y", "\tldy  (ZP_SCRATCH_W1),y", "\trts"];
        assert_eq!(optimize(&text), text);
        let text = ["\tldx  ESTACK_LO,x", "\tldx  ESTACK_LO,x"];
        assert_eq!(optimize(&text), text);
        // loading A does not move the index
        assert_eq!(optimize(&["\tlda  ESTACK_LO,x", "\tlda  ESTACK_LO,x"]), ["\tlda  ESTACK_LO,x"]);
    }

    #[test]
    fn clobbered_pointer() {
        let text = [
            "\tlda  (ZP_SCRATCH_W1),y",
            "\tsta  ZP_SCRATCH_W1",
            "\tlda  (ZP_SCRATCH_W1),y",
            "\tsta  main.b",
        ];
        assert_eq!(optimize(&text), text);
    }

    #[test]
    fn register_transfer() {
        let out = optimize(&["\tsta  main.x", "\tldy  main.x", "\tsta  main.x", "\trts"]);
        assert_eq!(out, ["\tsta  main.x", "\ttay", "\trts"]);
    }

    #[test]
    fn store_twice_load_twice() {
        let out = optimize(&[
            "\tsta  main.w",
            "\tsty  main.w+1",
            "\tlda  main.w",
            "\tldy  main.w+1",
            "\tjsr  sys.print_u16",
        ]);
        assert_eq!(out, ["\tsta  main.w", "\tsty  main.w+1", "\tjsr  sys.print_u16"]);
    }

    #[test]
    fn middle_load_replaces_register() {
        let text = ["\tsta  main.x", "\tlda  main.y", "\tsta  main.x", "\trts"];
        assert_eq!(optimize(&text), text);
    }

    #[test]
    fn float_copy_source_reuse() {
        let copy = |dest: &'static str| {
            [
                "\tlda  #<main.f",
                "\tldy  #>main.f",
                "\tsta  ZP_SCRATCH_W2",
                "\tsty  ZP_SCRATCH_W2+1",
                dest,
                "\tldy  #>octet_float_reg_0",
                "\tjsr  floats.copy_float",
            ]
        };
        let mut text = copy("\tlda  #<octet_float_reg_0").to_vec();
        text.extend(copy("\tlda  #<octet_float_reg_0"));
        let out = optimize(&text);
        assert_eq!(out.len(), 10);
        assert_eq!(out[7], "\tlda  #<octet_float_reg_0");
        assert_eq!(out[9], "\tjsr  floats.copy_float");
    }
}
