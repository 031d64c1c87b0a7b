//! Shared call-emission helpers used by every injector that calls a mixin
//! handler directly (everything except Overwrite/Copy, which inline the
//! handler's body instead via component D).

use classfile::strings::{ClassName, FieldDescriptor, FieldName, MethodDescriptor, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::field::{Field, FieldAccess, FieldRef};
use classfile::tree::method::code::{Instruction, InstructionListEntry, LabelMap};
use classfile::tree::method::{MethodNameAndDesc, MethodRef};

/// `$asmInstance$<MixinSimpleName>` — the private static synthetic field a
/// target class gets so instance handlers have somewhere to dispatch
/// through (§3, §4.6 step 1).
pub fn singleton_field_name(mixin_class: &ClassName) -> FieldName {
	FieldName::from(format!("$asmInstance${}", mixin_class.simple_name()).as_str())
}

/// Ensures `target_class` carries the singleton field for `mixin_class`,
/// adding it if absent. Idempotent across repeated calls for the same pair.
pub fn ensure_singleton_field(target_class: &mut ClassFile, mixin_class: &ClassName) {
	let name = singleton_field_name(mixin_class);
	if target_class.find_field(name.as_str()).is_none() {
		let field = Field::new(
			FieldAccess { is_private: true, is_static: true, is_synthetic: true, ..Default::default() },
			name,
			FieldDescriptor::from(format!("L{mixin_class};").as_str()),
		);
		target_class.fields.push(field);
	}
}

/// Emits the lazy-init-and-load sequence for an instance handler's
/// receiver, leaving it on the stack; a no-op for static handlers. Uses
/// `labels` (the target method's refreshed label map) to mint the
/// skip-init branch target, per §9's note that this null-check is plain and
/// not barrier-guarded.
pub fn emit_receiver(target_class: &ClassName, mixin_class: &ClassName, handler_is_static: bool, labels: &mut LabelMap) -> Vec<InstructionListEntry> {
	if handler_is_static {
		return Vec::new();
	}

	let field_ref = FieldRef { class: target_class.clone(), name: singleton_field_name(mixin_class), desc: FieldDescriptor::from(format!("L{mixin_class};").as_str()) };
	let after = labels.fresh();

	vec![
		InstructionListEntry::plain(Instruction::GetStatic(field_ref.clone())),
		InstructionListEntry::plain(Instruction::Dup),
		InstructionListEntry::plain(Instruction::IfNonNull(after)),
		InstructionListEntry::plain(Instruction::Pop),
		InstructionListEntry::plain(Instruction::New(mixin_class.clone())),
		InstructionListEntry::plain(Instruction::Dup),
		InstructionListEntry::plain(Instruction::InvokeSpecial(MethodRef { class: mixin_class.clone(), name: MethodName::from(MethodName::INIT), desc: MethodDescriptor::from("()V") }, false)),
		InstructionListEntry::plain(Instruction::Dup),
		InstructionListEntry::plain(Instruction::PutStatic(field_ref)),
		InstructionListEntry { label: Some(after), instruction: Instruction::Nop },
	]
}

/// The `invoke*` instruction that calls `handler` on `mixin_class`, once its
/// receiver (if any) and arguments are already on the stack.
pub fn invoke_instruction(mixin_class: &ClassName, handler: &MethodNameAndDesc, handler_is_static: bool) -> Instruction {
	let method_ref = MethodRef { class: mixin_class.clone(), name: handler.name.clone(), desc: handler.desc.clone() };
	if handler_is_static {
		Instruction::InvokeStatic(method_ref, false)
	} else {
		Instruction::InvokeVirtual(method_ref)
	}
}

/// Builds `[receiver] [new CallbackInfo; dup; invokespecial <init>]? invoke
/// handler [pop if non-void]`: a self-contained call to `handler` whose
/// `CallbackInfo` (if requested) is neither stored nor read back, for
/// injectors (TAIL, INVOKE) that don't need to inspect it afterward.
pub fn build_void_call_block(
	target_class: &ClassName,
	mixin_class: &ClassName,
	handler: &MethodNameAndDesc,
	handler_is_static: bool,
	wants_info: bool,
	handler_returns_value: bool,
	labels: &mut LabelMap,
) -> Vec<InstructionListEntry> {
	let mut block = emit_receiver(target_class, mixin_class, handler_is_static, labels);

	if wants_info {
		block.push(InstructionListEntry::plain(Instruction::New(classfile::strings::ClassName::from(crate::callback::CALLBACK_INFO_CLASS))));
		block.push(InstructionListEntry::plain(Instruction::Dup));
		block.push(InstructionListEntry::plain(Instruction::InvokeSpecial(
			MethodRef { class: classfile::strings::ClassName::from(crate::callback::CALLBACK_INFO_CLASS), name: MethodName::from("<init>"), desc: MethodDescriptor::from("()V") },
			false,
		)));
	}

	block.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));
	if handler_returns_value {
		block.push(InstructionListEntry::plain(Instruction::Pop));
	}

	block
}
