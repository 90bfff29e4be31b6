/// Mappings rendered by `build.rs`, as `(module name, mapping text)`
pub const CORPUS: &[(&str, &str)] = &[
    (
        "lookup_and_coalesce",
        "@config { null_handling: omit }\nuser.status : status | lookup(@{\"A\":\"ACTIVE\"})\nuser.mobile ?? user.phone : primaryPhone\nuser.mobile : mobile\n",
    ),
    (
        "wildcards",
        "tags[*] : interests[*] | lowercase\nitems[*].name : products[*].title | uppercase\nitems[*].price : products[*].price | to_float\n",
    ),
    ("nested_wildcards", "orders[*].lines[*].sku : orders[*].skus\n"),
    (
        "concat",
        "people[*].first + \" \" + people[*].last : names[*]\nfirst + \"-\" + id : key\n",
    ),
    ("cardinality", "a[*] + b[*] : out[*]\nok : ok\n"),
    (
        "chains",
        "pi : pi | to_float | round(2)\ngreeting : greeting | trim | collapse_spaces | titlecase\n",
    ),
    (
        "case_groups",
        "code : label | when(\"A\", \"Alpha\") | when(\"B\", \"Beta\") | else(\"Other\") | uppercase\nnote : note | else(\"none\")\n",
    ),
    (
        "aliases",
        "@aliases {\n Clean: trim | collapse_spaces\n Title: @Clean | titlecase\n}\n@lookups { status: { \"A\": \"ACTIVE\", 1: \"one\" } }\nname : name | @Title\ncode : code | lookup(@status)\n",
    ),
    (
        "compute",
        "@compute(count(items[*])) : summary.count\n@compute(sum(items[*].price)) : summary.total\n@compute(avg(items[*].price)) : summary.mean\n@compute(min(items[*].price)) : summary.low\n@compute(qty * unit) : line_total\n@compute(qty / 0) : broken\n@compute(qty - 1) : less\n",
    ),
    (
        "host_functions",
        "@functions { discount: \"pricing:discount\" }\n@compute(discount(price, pct)) : net\n@call(discount, price, 10) : ten_off\nname : loud | shout\nname : bracketed | trim\n@call(nowhere, name) : lost\n",
    ),
    (
        "null_default",
        "@config { null_handling: default }\nqty : qty | to_int\nnote : note\nflag : flag | to_bool\n",
    ),
    (
        "missing_skip",
        "@config { missing_fields: skip }\nid : id\nname : name | default(\"anon\")\n",
    ),
    (
        "missing_error",
        "@config { missing_fields: error }\nid : id\nnick? : nick\nname : name\n",
    ),
    (
        "strict",
        "@config { strict_mode: true }\nid : id\nxs[5] : x\nage : age | to_int\n",
    ),
    (
        "lenient",
        "xs[5] : x\nxs[-1] : last\nage : age | to_int\nlabel : label | validate(\"email\")\n",
    ),
    (
        "merge_targets",
        "items[*].sku : lines[*].id\nitems[*].qty : lines[*].count | to_int\nmeta : extra\nmeta.id : extra.id\n",
    ),
    (
        "array_builtins",
        "xs : xs | distinct | sort\nxs : top | sort(true) | take(2)\nxs : n | count\nwords : joined | join(\",\")\n",
    ),
    ("blocked_broadcast", "a : out[1]\nxs[*] : out[*].id\n"),
    ("truthiness", "f : f | to_bool\nflag : flag | negate\n"),
];
