//! Property-based tests: unwind synthesis must produce a well-formed plan
//! for any prologue-shaped instruction sequence.

use callframe::abi::ArmAbi;
use callframe::arch::ArchSpec;
use callframe::emulate::{AddressRange, assemble};
use callframe::plan::UnwindPlan;
use callframe::registers::arm::{DWARF_R7, DWARF_SP};
use callframe::unwind::InstructionEmulationUnwinder;
use proptest::prelude::*;

fn prologue_word() -> impl Strategy<Value = u32> {
    prop_oneof![
        (1u16..=0x7FFF).prop_map(assemble::push),
        (1u16..=0x7FFF).prop_map(assemble::pop),
        (0u32..16, 1u32..=63).prop_map(|(rt, slots)| assemble::store_below_sp(rt, slots * 4)),
        (1u32..=63).prop_map(|slots| assemble::sub_sp(slots * 4)),
        (1u32..=63).prop_map(|slots| assemble::add_sp(slots * 4)),
        Just(assemble::mov_fp_sp()),
        Just(assemble::bx_lr()),
    ]
}

fn synthesize(words: &[u32]) -> UnwindPlan {
    let arch = ArchSpec::parse("arm-apple-darwin").unwrap();
    let mut unwinder = InstructionEmulationUnwinder::for_arch(&arch).unwrap();
    let code = assemble::to_bytes(words);
    let range = AddressRange::new(0x4000, code.len() as u64);
    unwinder.synthesize(&range, &code, &ArmAbi).unwrap()
}

proptest! {
    #[test]
    fn plan_is_well_formed(words in prop::collection::vec(prologue_word(), 1..24)) {
        let plan = synthesize(&words);

        // Always at least the entry row, never more rows than instructions
        // plus the entry row.
        prop_assert!(plan.row_count() >= 1);
        prop_assert!(plan.row_count() <= words.len() + 1);
        prop_assert!(plan.is_valid_at_all_instruction_locations());

        // The first row covers offset zero and later rows never go
        // backwards.
        prop_assert_eq!(plan.row_at_index(0).unwrap().offset(), 0);
        let offsets: Vec<u64> = plan.rows().map(|row| row.offset()).collect();
        prop_assert!(offsets.windows(2).all(|pair| pair[0] <= pair[1]));

        // The CFA is only ever anchored to sp or the frame pointer.
        for row in plan.rows() {
            prop_assert!(row.cfa_register() == DWARF_SP || row.cfa_register() == DWARF_R7);
        }
    }

    #[test]
    fn every_offset_resolves_to_a_row(words in prop::collection::vec(prologue_word(), 1..24)) {
        let plan = synthesize(&words);
        for offset in (0..words.len() as u64 * 4).step_by(4) {
            prop_assert!(plan.row_for_offset(offset).is_some());
        }
    }

    #[test]
    fn frame_pointer_anchor_never_reverts(words in prop::collection::vec(prologue_word(), 1..24)) {
        let plan = synthesize(&words);
        let mut seen_fp = false;
        for row in plan.rows() {
            if seen_fp {
                prop_assert_eq!(row.cfa_register(), DWARF_R7);
            }
            seen_fp |= row.cfa_register() == DWARF_R7;
        }
    }
}
