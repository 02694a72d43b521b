//! Embedded gong kebyar lookup tables. These mirror the on-disk TSV formats
//! so the transcriber runs without external data files; `--data-dir`
//! overrides any of them.

pub const FONT: &str = "symbol	pitch	octave	stroke	duration	rest_after	modifier
i	DING	1	OPEN	1	0	NONE
o	DONG	1	OPEN	1	0	NONE
e	DENG	1	OPEN	1	0	NONE
r	DEUNG	1	OPEN	1	0	NONE
u	DUNG	1	OPEN	1	0	NONE
a	DANG	1	OPEN	1	0	NONE
s	DAING	1	OPEN	1	0	NONE
I	DING	1	GRACE_NOTE	1/4	0	NONE
O	DONG	1	GRACE_NOTE	1/4	0	NONE
E	DENG	1	GRACE_NOTE	1/4	0	NONE
U	DUNG	1	GRACE_NOTE	1/4	0	NONE
A	DANG	1	GRACE_NOTE	1/4	0	NONE
b	BYONG	-	OPEN	1	0	NONE
G	GIR	-	OPEN	1	0	NONE
P	PUR	-	OPEN	1	0	NONE
T	TONG	-	OPEN	1	0	NONE
x	STRIKE	-	OPEN	1	0	NONE
-	NONE	-	EXTENSION	1	0	NONE
.	NONE	-	SILENCE	0	1	NONE
,	NONE	-	NONE	0	0	OCTAVE_0
<	NONE	-	NONE	0	0	OCTAVE_2
/	NONE	-	NONE	0	0	MUTE
?	NONE	-	NONE	0	0	ABBREVIATE
_	NONE	-	NONE	0	0	HALF_NOTE
=	NONE	-	NONE	0	0	QUARTER_NOTE
;	NONE	-	NONE	0	0	TREMOLO
:	NONE	-	NONE	0	0	TREMOLO_ACCELERATING
~	NONE	-	NONE	0	0	NOROT
";

pub const INSTRUMENTS: &str = "group	position	instrument	position_range	extended_position_range
GONG_KEBYAR	UGAL	UGAL	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2,DONG/2,DENG/2
GONG_KEBYAR	PEMADE_POLOS	PEMADE	DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2,DONG/2
GONG_KEBYAR	PEMADE_SANGSIH	PEMADE	DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2,DONG/2
GONG_KEBYAR	KANTILAN_POLOS	KANTILAN	DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2,DONG/2
GONG_KEBYAR	KANTILAN_SANGSIH	KANTILAN	DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1,DONG/1,DENG/1,DUNG/1,DANG/1,DING/2,DONG/2
GONG_KEBYAR	REYONG_1	REYONG	DENG/0,DUNG/0,DANG/0,DING/1	DENG/0,DUNG/0,DANG/0,DING/1
GONG_KEBYAR	REYONG_2	REYONG	DONG/1,DENG/1,DUNG/1,DANG/1	DONG/1,DENG/1,DUNG/1,DANG/1
GONG_KEBYAR	REYONG_3	REYONG	DING/2,DONG/2,DENG/2,DUNG/2	DING/2,DONG/2,DENG/2,DUNG/2
GONG_KEBYAR	REYONG_4	REYONG	DENG/2,DUNG/2,DANG/2	DENG/2,DUNG/2,DANG/2
GONG_KEBYAR	PENYACAH	PENYACAH	DING/1,DONG/1,DENG/1,DUNG/1,DANG/1	DING/1,DONG/1,DENG/1,DUNG/1,DANG/1
GONG_KEBYAR	CALUNG	CALUNG	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1
GONG_KEBYAR	JEGOGAN	JEGOGAN	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0	DING/0,DONG/0,DENG/0,DUNG/0,DANG/0,DING/1
GONG_KEBYAR	GONGS	GONGS	GIR/0,PUR/0,TONG/0	GIR/0,PUR/0,TONG/0
GONG_KEBYAR	KEMPLI	KEMPLI	STRIKE/0	STRIKE/0
";

pub const TAGS: &str = "tag	positions
ugal	UGAL
pemade	PEMADE_POLOS,PEMADE_SANGSIH
kantilan	KANTILAN_POLOS,KANTILAN_SANGSIH
pemade_polos	PEMADE_POLOS
pemade_sangsih	PEMADE_SANGSIH
kantilan_polos	KANTILAN_POLOS
kantilan_sangsih	KANTILAN_SANGSIH
gangsa	PEMADE_POLOS,PEMADE_SANGSIH,KANTILAN_POLOS,KANTILAN_SANGSIH
gangsa4	PEMADE_POLOS,PEMADE_SANGSIH,KANTILAN_POLOS,KANTILAN_SANGSIH
gangsa_p	PEMADE_POLOS,KANTILAN_POLOS
gangsa_s	PEMADE_SANGSIH,KANTILAN_SANGSIH
reyong	REYONG_1,REYONG_2,REYONG_3,REYONG_4
reyong1	REYONG_1
reyong2	REYONG_2
reyong3	REYONG_3
reyong4	REYONG_4
reyong13	REYONG_1,REYONG_3
reyong24	REYONG_2,REYONG_4
penyacah	PENYACAH
calung	CALUNG
jegogan	JEGOGAN
gongs	GONGS
kempli	KEMPLI
";

pub const RULES: &str = "group	ruletype	positions	param1	param2
GONG_KEBYAR	KEMPYUNG	ANY	DING/0>DUNG/0,DONG/0>DANG/0,DENG/0>DING/1,DUNG/0>DONG/1,DANG/0>DENG/1,DING/1>DUNG/1,DONG/1>DANG/1,DENG/1>DING/2,DUNG/1>DONG/2,DANG/1>DENG/2,DING/2>DUNG/2,DONG/2>DANG/2	-
GONG_KEBYAR	SHARED_NOTATION	ANY	ANY	SAME_PITCH,SAME_PITCH_EXTENDED_RANGE
GONG_KEBYAR	SHARED_NOTATION	PEMADE_SANGSIH	PEMADE_POLOS,PEMADE_SANGSIH	KEMPYUNG,SAME_PITCH
GONG_KEBYAR	SHARED_NOTATION	KANTILAN_SANGSIH	KANTILAN_POLOS,KANTILAN_SANGSIH	KEMPYUNG,SAME_PITCH
GONG_KEBYAR	SHARED_NOTATION	PEMADE_SANGSIH,KANTILAN_SANGSIH	PEMADE_POLOS,PEMADE_SANGSIH,KANTILAN_POLOS,KANTILAN_SANGSIH	KEMPYUNG,SAME_PITCH
GONG_KEBYAR	SHARED_NOTATION	PEMADE_POLOS,KANTILAN_POLOS	PEMADE_POLOS,PEMADE_SANGSIH,KANTILAN_POLOS,KANTILAN_SANGSIH	SAME_PITCH,SAME_PITCH_EXTENDED_RANGE
GONG_KEBYAR	POLOS_SANGSIH	PEMADE_POLOS,PEMADE_SANGSIH	-	-
GONG_KEBYAR	POLOS_SANGSIH	KANTILAN_POLOS,KANTILAN_SANGSIH	-	-
GONG_KEBYAR	ORNAMENT	NOROT	1:1/4,0:1/4,1:1/4,0:1/4	-
";

pub const MIDINOTES: &str = "group	instrument	pitch	octave	stroke	midinote
GONG_KEBYAR	UGAL	DING	0	OPEN	48
GONG_KEBYAR	UGAL	DONG	0	OPEN	50
GONG_KEBYAR	UGAL	DENG	0	OPEN	52
GONG_KEBYAR	UGAL	DUNG	0	OPEN	55
GONG_KEBYAR	UGAL	DANG	0	OPEN	57
GONG_KEBYAR	UGAL	DING	1	OPEN	60
GONG_KEBYAR	UGAL	DONG	1	OPEN	62
GONG_KEBYAR	UGAL	DENG	1	OPEN	64
GONG_KEBYAR	UGAL	DUNG	1	OPEN	67
GONG_KEBYAR	UGAL	DANG	1	OPEN	69
GONG_KEBYAR	UGAL	DING	2	OPEN	72
GONG_KEBYAR	UGAL	DONG	2	OPEN	74
GONG_KEBYAR	UGAL	DENG	2	OPEN	76
GONG_KEBYAR	PEMADE	DING	0	OPEN	60
GONG_KEBYAR	PEMADE	DONG	0	OPEN	62
GONG_KEBYAR	PEMADE	DENG	0	OPEN	64
GONG_KEBYAR	PEMADE	DUNG	0	OPEN	67
GONG_KEBYAR	PEMADE	DANG	0	OPEN	69
GONG_KEBYAR	PEMADE	DING	1	OPEN	72
GONG_KEBYAR	PEMADE	DONG	1	OPEN	74
GONG_KEBYAR	PEMADE	DENG	1	OPEN	76
GONG_KEBYAR	PEMADE	DUNG	1	OPEN	79
GONG_KEBYAR	PEMADE	DANG	1	OPEN	81
GONG_KEBYAR	PEMADE	DING	2	OPEN	84
GONG_KEBYAR	PEMADE	DONG	2	OPEN	86
GONG_KEBYAR	PEMADE	DENG	2	OPEN	88
GONG_KEBYAR	KANTILAN	DING	0	OPEN	72
GONG_KEBYAR	KANTILAN	DONG	0	OPEN	74
GONG_KEBYAR	KANTILAN	DENG	0	OPEN	76
GONG_KEBYAR	KANTILAN	DUNG	0	OPEN	79
GONG_KEBYAR	KANTILAN	DANG	0	OPEN	81
GONG_KEBYAR	KANTILAN	DING	1	OPEN	84
GONG_KEBYAR	KANTILAN	DONG	1	OPEN	86
GONG_KEBYAR	KANTILAN	DENG	1	OPEN	88
GONG_KEBYAR	KANTILAN	DUNG	1	OPEN	91
GONG_KEBYAR	KANTILAN	DANG	1	OPEN	93
GONG_KEBYAR	KANTILAN	DING	2	OPEN	96
GONG_KEBYAR	KANTILAN	DONG	2	OPEN	98
GONG_KEBYAR	KANTILAN	DENG	2	OPEN	100
GONG_KEBYAR	REYONG	DENG	0	OPEN	76
GONG_KEBYAR	REYONG	DUNG	0	OPEN	79
GONG_KEBYAR	REYONG	DANG	0	OPEN	81
GONG_KEBYAR	REYONG	DING	1	OPEN	84
GONG_KEBYAR	REYONG	DONG	1	OPEN	86
GONG_KEBYAR	REYONG	DENG	1	OPEN	88
GONG_KEBYAR	REYONG	DUNG	1	OPEN	91
GONG_KEBYAR	REYONG	DANG	1	OPEN	93
GONG_KEBYAR	REYONG	DING	2	OPEN	96
GONG_KEBYAR	REYONG	DONG	2	OPEN	98
GONG_KEBYAR	REYONG	DENG	2	OPEN	100
GONG_KEBYAR	REYONG	DUNG	2	OPEN	103
GONG_KEBYAR	REYONG	DANG	2	OPEN	105
GONG_KEBYAR	REYONG	BYONG	-	OPEN	107
GONG_KEBYAR	PENYACAH	DING	1	OPEN	60
GONG_KEBYAR	PENYACAH	DONG	1	OPEN	62
GONG_KEBYAR	PENYACAH	DENG	1	OPEN	64
GONG_KEBYAR	PENYACAH	DUNG	1	OPEN	67
GONG_KEBYAR	PENYACAH	DANG	1	OPEN	69
GONG_KEBYAR	CALUNG	DING	0	OPEN	48
GONG_KEBYAR	CALUNG	DONG	0	OPEN	50
GONG_KEBYAR	CALUNG	DENG	0	OPEN	52
GONG_KEBYAR	CALUNG	DUNG	0	OPEN	55
GONG_KEBYAR	CALUNG	DANG	0	OPEN	57
GONG_KEBYAR	CALUNG	DING	1	OPEN	60
GONG_KEBYAR	JEGOGAN	DING	0	OPEN	36
GONG_KEBYAR	JEGOGAN	DONG	0	OPEN	38
GONG_KEBYAR	JEGOGAN	DENG	0	OPEN	40
GONG_KEBYAR	JEGOGAN	DUNG	0	OPEN	43
GONG_KEBYAR	JEGOGAN	DANG	0	OPEN	45
GONG_KEBYAR	JEGOGAN	DING	1	OPEN	48
GONG_KEBYAR	GONGS	GIR	-	OPEN	35
GONG_KEBYAR	GONGS	PUR	-	OPEN	36
GONG_KEBYAR	GONGS	TONG	-	OPEN	37
GONG_KEBYAR	KEMPLI	STRIKE	-	OPEN	39
";

pub const PRESETS: &str = "group	position	bank	program	channel
GONG_KEBYAR	UGAL	0	0	0
GONG_KEBYAR	PEMADE_POLOS	0	1	1
GONG_KEBYAR	PEMADE_SANGSIH	0	1	2
GONG_KEBYAR	KANTILAN_POLOS	0	2	3
GONG_KEBYAR	KANTILAN_SANGSIH	0	2	4
GONG_KEBYAR	REYONG_1	0	3	5
GONG_KEBYAR	REYONG_2	0	3	6
GONG_KEBYAR	REYONG_3	0	3	7
GONG_KEBYAR	REYONG_4	0	3	8
GONG_KEBYAR	PENYACAH	0	4	10
GONG_KEBYAR	CALUNG	0	5	11
GONG_KEBYAR	JEGOGAN	0	6	12
GONG_KEBYAR	GONGS	0	7	13
GONG_KEBYAR	KEMPLI	0	8	14
";
