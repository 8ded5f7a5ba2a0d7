#[cfg(test)]
mod types_tests {
    use crate::error::CodegenError;
    use crate::signatures::{StructSignature, StructTable};
    use crate::types::*;

    fn structs() -> StructTable {
        let mut table = StructTable::new();
        table.insert(StructSignature {
            name: "Pair".to_string(),
            fields: vec![],
            size: 8,
        });
        table
    }

    #[test]
    fn test_primitive_names() {
        let table = structs();
        for (name, width, signed) in [
            ("i8", 1, true),
            ("u8", 1, false),
            ("i16", 2, true),
            ("u16", 2, false),
            ("i32", 4, true),
            ("u32", 4, false),
        ] {
            let ty = Type::parse(name, &table).unwrap();
            assert_eq!(ty, Type::Primitive { width, signed });
            assert_eq!(ty.aligned_size(), width);
            assert!(ty.is_primitive());
            assert_eq!(ty.to_string(), name);
        }
    }

    #[test]
    fn test_instruction_selection_helpers() {
        let table = structs();
        let byte = Type::parse("u8", &table).unwrap();
        let word = Type::parse("i16", &table).unwrap();
        let dword = Type::parse("u32", &table).unwrap();

        assert_eq!((byte.asm_size(), byte.register()), ("BYTE", "al"));
        assert_eq!((word.asm_size(), word.register()), ("WORD", "ax"));
        assert_eq!((dword.asm_size(), dword.register()), ("DWORD", "eax"));
    }

    #[test]
    fn test_pointers_are_primitive_dwords() {
        let table = structs();
        let ty = Type::parse("u8**", &table).unwrap();

        assert!(ty.is_primitive());
        assert!(ty.is_pointer());
        assert_eq!(ty.aligned_size(), 4);
        assert_eq!(ty.pointee().unwrap().to_string(), "u8*");
        assert_eq!(ty.to_string(), "u8**");
        assert_eq!(Type::pointer_to(Type::u8()), Type::parse("u8*", &table).unwrap());
    }

    #[test]
    fn test_arrays_round_to_dwords() {
        let table = structs();
        let ty = Type::parse("u8(5)", &table).unwrap();

        assert!(!ty.is_primitive());
        assert_eq!(ty.ideal_size(), 5);
        assert_eq!(ty.aligned_size(), 8);
        assert_eq!(ty.pointee(), Some(&Type::u8()));

        let words = Type::parse("u16(3)", &table).unwrap();
        assert_eq!(words.ideal_size(), 6);
        assert_eq!(words.aligned_size(), 8);
    }

    #[test]
    fn test_suffixes_bind_from_the_right() {
        let table = structs();

        let array_of_pointers = Type::parse("u8*(4)", &table).unwrap();
        assert!(array_of_pointers.is_array());
        assert_eq!(array_of_pointers.aligned_size(), 16);

        let pointer_to_array = Type::parse("u8(4)*", &table).unwrap();
        assert!(pointer_to_array.is_pointer());
        assert_eq!(pointer_to_array.aligned_size(), 4);
        let array = pointer_to_array.pointee().unwrap();
        assert!(array.is_array());
        assert_eq!(array.aligned_size(), 4);
        assert_eq!(array.pointee(), Some(&Type::u8()));
    }

    #[test]
    fn test_struct_lookup() {
        let table = structs();
        let pair = Type::parse("Pair", &table).unwrap();
        assert!(!pair.is_primitive());
        assert_eq!(pair.aligned_size(), 8);
        assert_eq!(pair.to_string(), "Pair");

        let pairs = Type::parse("Pair(3)", &table).unwrap();
        assert_eq!(pairs.aligned_size(), 24);
    }

    #[test]
    fn test_unknown_and_malformed_descriptors() {
        let table = structs();
        for descriptor in ["Missing", "i64", "u8(x)", "u8)", ""] {
            assert_eq!(
                Type::parse(descriptor, &table),
                Err(CodegenError::UnknownType(descriptor.to_string())),
                "descriptor {:?}",
                descriptor
            );
        }
    }

    #[test]
    fn test_oversized_arrays_are_rejected() {
        let table = structs();
        for descriptor in [
            "i32(1073741824)",
            "u8(1073741825)",
            "Pair(4294967295)",
            "u8(1000)(2000000)",
        ] {
            assert!(
                matches!(
                    Type::parse(descriptor, &table),
                    Err(CodegenError::NotSupported(_))
                ),
                "descriptor {:?}",
                descriptor
            );
        }

        let largest = Type::parse("u8(1073741824)", &table).unwrap();
        assert_eq!(largest.aligned_size(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(5, 2), 6);
        assert_eq!(align_up(7, 1), 7);
    }
}
